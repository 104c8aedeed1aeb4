//! Bridge contract configuration.

use url::Url;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Lowercase `0x` prefixed bridge contract address.
    pub address: String,
    /// Endpoint serving the bridge state snapshot as JSON.
    pub state_url: Url,
}
