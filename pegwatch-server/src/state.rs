//! Application state shared across all request handlers.

use pegwatch_core::processors::ChainSynchronizer;
use std::sync::Arc;

/// Cloneable; everything is behind Arc.
#[derive(Clone)]
pub struct AppState {
    /// Read-only view of the synchronized chain.
    pub synchronizer: Arc<ChainSynchronizer>,
}

impl AppState {
    pub fn new(synchronizer: Arc<ChainSynchronizer>) -> Self {
        Self { synchronizer }
    }
}
