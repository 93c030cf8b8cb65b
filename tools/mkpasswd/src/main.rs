use anyhow::{Context, Result};
use clap::Parser;
use oxircd_modules::account::encode_password;

/// oxircd password encoding utility
///
/// Produces the encoded password form stored in oxircd account rows, under
/// the same algorithm tags the server accepts.
#[derive(Parser, Debug)]
#[command(
    name = "mkpasswd",
    version,
    about = "Encode passwords for oxircd account rows"
)]
struct Cli {
    /// Password to encode (reads stdin when omitted)
    #[arg(short, long)]
    password: Option<String>,

    /// Encoding algorithm tag
    #[arg(short, long, default_value = "sha1")]
    algorithm: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let password = match cli.password {
        Some(password) => {
            eprintln!("Warning: passwords on the command line end up in shell history.");
            password
        }
        None => {
            use std::io::Read;
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read password from stdin")?;
            buffer.trim().to_string()
        }
    };

    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let encoded = encode_password(&password, &cli.algorithm)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("{}", encoded);
    println!("encrypt = {:?}", cli.algorithm);

    Ok(())
}
