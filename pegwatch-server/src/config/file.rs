//! TOML file configuration structures.
//!
//! These structs directly map to the `pegwatch-config.toml` file format.

use serde::Deserialize;
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub node: NodeConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub pegout: PegoutConfig,
}

/// Health server section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// JSON-RPC endpoint of the RSK node.
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_address")]
    pub address: String,
    /// `mainnet`, `testnet` or `regtest`.
    #[serde(default = "default_network")]
    pub network: String,
    /// Endpoint serving the bridge state snapshot.
    pub state_url: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: default_bridge_address(),
            network: default_network(),
            state_url: None,
        }
    }
}

fn default_bridge_address() -> String {
    pegwatch_core::bridge::BRIDGE_ADDRESS.to_string()
}

fn default_network() -> String {
    "mainnet".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub min_depth: i64,
    /// Block to start after when the database is empty.
    pub default_block: DefaultBlockConfig,
}

fn default_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultBlockConfig {
    pub height: i64,
    pub hash: String,
    pub parent_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PegoutConfig {
    #[serde(default = "default_confirmations_threshold")]
    pub confirmations_threshold: i64,
    #[serde(default)]
    pub batch_pegout_enabled: bool,
}

impl Default for PegoutConfig {
    fn default() -> Self {
        Self {
            confirmations_threshold: default_confirmations_threshold(),
            batch_pegout_enabled: false,
        }
    }
}

fn default_confirmations_threshold() -> i64 {
    4000
}
