//! Configuration module for pegwatch-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::FileConfig;
use pegwatch_core::config::{BridgeConfig, NodeConfig, PegoutConfig, PegwatchConfig, SyncConfig};
use pegwatch_core::entities::sync_status::SyncStatus;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration: the health server address plus everything the
/// daemon needs.
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub pegwatch: PegwatchConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        build_loaded_config(file_config)
    }
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let FileConfig {
        server,
        node,
        bridge,
        sync,
        pegout,
    } = file_config;

    if node.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "node.url must not be empty".to_string(),
        ));
    }
    let node_url = parse_url("node.url", &node.url)?;

    if !is_address(&bridge.address) {
        return Err(ConfigError::ValidationError(format!(
            "bridge.address {} is not a 20 byte hex address",
            bridge.address
        )));
    }
    let network = parse_network(&bridge.network)?;
    let state_url = bridge
        .state_url
        .as_deref()
        .ok_or_else(|| ConfigError::ValidationError("bridge.state_url is required".to_string()))
        .and_then(|url| parse_url("bridge.state_url", url))?;

    if sync.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sync.interval_secs must be greater than zero".to_string(),
        ));
    }
    if sync.min_depth < 0 {
        return Err(ConfigError::ValidationError(
            "sync.min_depth must not be negative".to_string(),
        ));
    }

    let default_block = sync.default_block;
    Ok(LoadedConfig {
        listen: server.listen,
        pegwatch: PegwatchConfig {
            node: NodeConfig {
                url: node_url,
                request_timeout: Duration::from_secs(node.request_timeout_secs),
            },
            bridge: BridgeConfig {
                address: bridge.address.to_lowercase(),
                state_url,
            },
            sync: SyncConfig {
                interval: Duration::from_secs(sync.interval_secs),
                min_depth: sync.min_depth,
                default_block: SyncStatus::new(
                    default_block.height,
                    default_block.hash.to_lowercase(),
                    default_block.parent_hash.to_lowercase(),
                ),
            },
            pegout: PegoutConfig {
                confirmations_threshold: pegout.confirmations_threshold,
                batch_pegout_enabled: pegout.batch_pegout_enabled,
                network,
            },
        },
    })
}

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value)
        .map_err(|e| ConfigError::ValidationError(format!("{} {} is invalid: {}", field, value, e)))
}

fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

fn parse_network(value: &str) -> Result<bitcoin::Network, ConfigError> {
    match value.to_lowercase().as_str() {
        "mainnet" | "bitcoin" => Ok(bitcoin::Network::Bitcoin),
        "testnet" => Ok(bitcoin::Network::Testnet),
        "regtest" => Ok(bitcoin::Network::Regtest),
        other => Err(ConfigError::ValidationError(format!(
            "unknown bridge.network {}",
            other
        ))),
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
