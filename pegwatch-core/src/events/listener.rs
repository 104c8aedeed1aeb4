use crate::entities::sync_status::SyncStatus;
use crate::node::{Block, NodeError};
use crate::store::StoreError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("node error: {0}")]
    Node(#[from] NodeError),
}

/// Observer of chain reconciliation.
#[async_trait]
pub trait ChainListener: Send + Sync {
    /// A block became canonical and has been persisted.
    async fn block_added(&self, block: &Block) -> Result<(), ListenerError>;

    /// A previously synchronized block was orphaned and is about to be
    /// deleted.
    async fn block_deleted(&self, status: &SyncStatus) -> Result<(), ListenerError>;
}
