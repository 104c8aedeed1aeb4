//! Ledger node configuration.

use std::time::Duration;
use url::Url;

/// Connection settings for the ledger node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// JSON-RPC endpoint.
    pub url: Url,
    /// Upper bound for a single node request.
    pub request_timeout: Duration,
}
