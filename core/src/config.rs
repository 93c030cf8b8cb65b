//! Configuration management

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server information
    pub server: ServerConfig,
    /// Account settings
    #[serde(default)]
    pub account: AccountConfig,
    /// Channel settings
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Services settings
    #[serde(default)]
    pub services: ServicesConfig,
    /// Outbound server links
    #[serde(default)]
    pub links: Vec<LinkBlock>,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name
    pub name: String,
    /// Server ID (TS6 SID: one digit followed by two alphanumerics)
    pub sid: String,
    /// Server description
    pub description: String,
}

/// Account settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Password encoding algorithm tag stored in account rows
    pub encryption: String,
    /// Path to the accounts database file
    pub database: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            encryption: "sha1".to_string(),
            database: "accounts.db".to_string(),
        }
    }
}

/// Channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Modes applied when a local user creates a channel.
    /// The literal `+user` is substituted with the joining user's UID.
    pub automodes: Option<String>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            automodes: Some("+ntqo +user +user".to_string()),
        }
    }
}

/// Services settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Nickname of the SASL authentication agent on the services link
    pub sasl_agent: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            sasl_agent: "SaslServ".to_string(),
        }
    }
}

/// Outbound link configuration block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkBlock {
    /// Remote server name
    pub name: String,
    /// Remote address (IPv6 if it contains a colon)
    pub address: String,
    /// Remote port
    pub port: u16,
    /// Whether to use TLS
    #[serde(default)]
    pub tls: bool,
    /// Link protocol of the remote ircd
    pub ircd: Option<String>,
    /// Autoconnect interval in seconds; absent or zero disables autoconnect
    #[serde(default, alias = "auto_timer")]
    pub auto_timeout: Option<u64>,
}

impl LinkBlock {
    /// Whether autoconnect is enabled for this link
    pub fn autoconnect(&self) -> bool {
        self.auto_timeout.map(|t| t > 0).unwrap_or(false)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "irc.example.org".to_string(),
                sid: "0AA".to_string(),
                description: "oxircd server".to_string(),
            },
            account: AccountConfig::default(),
            channels: ChannelsConfig::default(),
            services: ServicesConfig::default(),
            links: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Write configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Look up an outbound link block by name, case-insensitively
    pub fn get_link(&self, name: &str) -> Option<&LinkBlock> {
        self.links
            .iter()
            .find(|link| link.name.eq_ignore_ascii_case(name))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.name.is_empty() {
            return Err(Error::Config("Server name cannot be empty".to_string()));
        }

        let sid = self.server.sid.as_bytes();
        if sid.len() != 3
            || !sid[0].is_ascii_digit()
            || !sid[1..].iter().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(Error::Config(format!(
                "Invalid server ID {:?}: expected a digit followed by two alphanumerics",
                self.server.sid
            )));
        }

        for link in &self.links {
            if link.name.is_empty() || link.address.is_empty() {
                return Err(Error::Config(
                    "Link blocks require a name and an address".to_string(),
                ));
            }
            if link.port == 0 {
                return Err(Error::Config(format!(
                    "Link {} has an invalid port",
                    link.name
                )));
            }
            let duplicates = self
                .links
                .iter()
                .filter(|other| other.name.eq_ignore_ascii_case(&link.name))
                .count();
            if duplicates > 1 {
                return Err(Error::Config(format!(
                    "Duplicate link block for {}",
                    link.name
                )));
            }
        }

        match self.account.encryption.as_str() {
            "sha1" | "sha256" | "sha512" => {}
            other => {
                return Err(Error::Config(format!(
                    "Unsupported account encryption algorithm {:?}",
                    other
                )));
            }
        }

        Ok(())
    }
}
