//! Pegout processing configuration.

/// Settings for the pegout status processor.
#[derive(Debug, Clone)]
pub struct PegoutConfig {
    /// Ledger blocks a pegout waits in WAITING_FOR_CONFIRMATION before it can
    /// move to WAITING_FOR_SIGNATURE.
    pub confirmations_threshold: i64,
    /// Whether `batch_pegout_created` events are processed.
    pub batch_pegout_enabled: bool,
    /// Bitcoin network used to render output addresses.
    pub network: bitcoin::Network,
}
