//! Chain synchronization configuration.

use crate::entities::sync_status::SyncStatus;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay between the end of one sync cycle and the start of the next.
    pub interval: Duration,
    /// Number of blocks the node head must be ahead before a block is
    /// considered stable enough to sync.
    pub min_depth: i64,
    /// Block sync starts after when nothing has been persisted yet.
    ///
    /// It is never written to the store.
    pub default_block: SyncStatus,
}
