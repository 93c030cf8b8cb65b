//! oxircd - Main binary

use clap::{Parser, Subcommand};
use oxircd_core::{Config, Database, LinkEvent, Server, ServerConnectionManager};
use oxircd_modules::{AccountModule, AccountStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// oxircd - an IRC daemon core
#[derive(Parser)]
#[command(name = "oxircd")]
#[command(about = "An IRC daemon core: channels, modes, linkage, accounts and SASL")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Test configuration and exit
    #[arg(long)]
    test_config: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a default configuration file
    Config {
        /// Output file path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    if let Some(Commands::Config { output }) = cli.command {
        let config = Config::default();
        config.to_file(&output)?;
        println!("Generated default configuration file: {:?}", output);
        return Ok(());
    }

    let config = if cli.config.exists() {
        info!("Loading configuration from {:?}", cli.config);
        Config::from_file(&cli.config)?
    } else {
        info!("Configuration file not found, using defaults");
        Config::default()
    };
    config.validate()?;
    if cli.test_config {
        info!("Configuration is valid");
        return Ok(());
    }

    let config = Arc::new(config);
    let pool = Arc::new(Database::new());
    pool.add_server(Server::new(
        config.server.name.clone(),
        config.server.sid.clone(),
        config.server.description.clone(),
        0,
    ))?;

    let accounts = AccountModule::new(
        AccountStore::open(&config.account.database)?,
        &config.account.encryption,
        &config.server.name,
        &config.server.sid,
    );
    info!(
        "Accounts database {} holds {} accounts",
        config.account.database,
        accounts.store().count()?
    );

    let (links, mut link_events) = ServerConnectionManager::new(Arc::clone(&config), pool);

    info!("Starting oxircd as {} [{}]", config.server.name, config.server.sid);
    for block in &config.links {
        if !block.autoconnect() {
            continue;
        }
        match links.connect_server(&block.name, true) {
            Ok(()) => info!("Autoconnect armed for {}", block.name),
            Err(e) => warn!("Autoconnect for {} not armed: {}", block.name, e),
        }
    }

    loop {
        tokio::select! {
            event = link_events.recv() => match event {
                Some(LinkEvent::Established { name, protocol }) => {
                    info!("Link to {} established ({})", name, protocol.name());
                }
                Some(LinkEvent::ConnectFail { name, reason }) => {
                    warn!("connect_fail: {}: {}", name, reason);
                }
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Signal handling failed: {}", e);
                }
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Initialize logging
fn init_logging(level: &str) {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();
}
