//! Configuration types for pegwatch.
//!
//! These types represent the validated runtime configuration used by the
//! daemon and the processors. Loading and parsing the configuration file is
//! handled by the server crate.

mod bridge;
mod node;
mod pegout;
mod sync;

pub use bridge::BridgeConfig;
pub use node::NodeConfig;
pub use pegout::PegoutConfig;
pub use sync::SyncConfig;

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct PegwatchConfig {
    pub node: NodeConfig,
    pub bridge: BridgeConfig,
    pub sync: SyncConfig,
    pub pegout: PegoutConfig,
}
