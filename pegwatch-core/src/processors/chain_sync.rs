//! ChainSynchronizer processor.
//!
//! The ChainSynchronizer is responsible for:
//! - Comparing the best persisted block with the node head
//! - Unwinding orphaned blocks when the ledger reorganizes
//! - Persisting newly canonical blocks in ascending order
//! - Notifying `ChainListener`s of every deletion and addition
//!
//! No cursor is kept between calls: every `sync` starts from what is
//! persisted, so a call that failed halfway is simply retried.

use crate::entities::sync_status::SyncStatus;
use crate::events::{ChainListener, ListenerError, SubscriberList};
use crate::node::{Block, BlockTag, LedgerNode, NodeError};
use crate::store::{StoreError, SyncStatusStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A listener failed to clean up after an orphaned block. The block
    /// stays persisted so the next call unwinds it again.
    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    /// The fork point lies below the configured default block.
    #[error("fork at height {height} reaches below the default block")]
    ForkBelowDefault { height: i64 },

    /// A persisted block points at a parent that is neither persisted nor
    /// the default block.
    #[error("parent {parent_hash} of synchronized block {hash} is missing")]
    MissingParent { hash: String, parent_hash: String },
}

/// Outcome of one `sync` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub deleted: usize,
}

pub struct ChainSynchronizer {
    node: Arc<dyn LedgerNode>,
    store: Arc<dyn SyncStatusStore>,
    min_depth: i64,
    default_block: SyncStatus,
    listeners: SubscriberList<dyn ChainListener>,
}

impl ChainSynchronizer {
    /// # Arguments
    ///
    /// * `min_depth` - Blocks the head must be ahead of the next block
    /// * `default_block` - Treated as the best block while nothing is
    ///   persisted; never written
    pub fn new(
        node: Arc<dyn LedgerNode>,
        store: Arc<dyn SyncStatusStore>,
        min_depth: i64,
        default_block: SyncStatus,
    ) -> Self {
        Self {
            node,
            store,
            min_depth,
            default_block,
            listeners: SubscriberList::new(),
        }
    }

    /// Best persisted block, or the default block.
    pub async fn sync_status(&self) -> Result<SyncStatus, SyncError> {
        Ok(self
            .store
            .get_best()
            .await?
            .unwrap_or_else(|| self.default_block.clone()))
    }

    /// Returns `false` if the listener was already subscribed.
    pub async fn subscribe(&self, listener: Arc<dyn ChainListener>) -> bool {
        self.listeners.add(listener).await
    }

    pub async fn unsubscribe(&self, listener: &Arc<dyn ChainListener>) -> bool {
        self.listeners.remove(listener).await
    }

    /// Advance the persisted chain by at most one block, unwinding any
    /// orphaned blocks first.
    ///
    /// Callers must not run two `sync` calls concurrently.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let mut best = self.sync_status().await?;
        let head = self.node.get_block(BlockTag::Latest, false).await?;

        if head.height - self.min_depth <= best.height + 1 {
            debug!(
                best = best.height,
                head = head.height,
                min_depth = self.min_depth,
                "Head not deep enough, nothing to sync"
            );
            return Ok(SyncReport::default());
        }

        let mut report = SyncReport::default();
        let next = self
            .node
            .get_block(BlockTag::Height(best.height + 1), true)
            .await?;
        let mut stack = vec![next];

        while let Some((height, parent_hash)) = stack
            .last()
            .map(|block| (block.height, block.parent_hash.clone()))
        {
            if best.hash == parent_hash {
                break;
            }
            if best.hash == self.default_block.hash {
                return Err(SyncError::ForkBelowDefault { height });
            }

            info!(height = best.height, hash = %best.hash, "Block orphaned, unwinding");
            self.notify_deleted(&best).await?;
            self.store.delete(&best.hash).await?;
            report.deleted += 1;

            best = self.parent_of(&best).await?;
            let block = self
                .node
                .get_block(BlockTag::Height(height - 1), true)
                .await?;
            stack.push(block);
        }

        while let Some(block) = stack.pop() {
            self.store.set(SyncStatus::from_block(&block)).await?;
            debug!(height = block.height, hash = %block.hash, "Block synchronized");
            self.notify_added(&block).await;
            report.added += 1;
        }

        Ok(report)
    }

    async fn parent_of(&self, status: &SyncStatus) -> Result<SyncStatus, SyncError> {
        if status.parent_hash == self.default_block.hash {
            return Ok(self.default_block.clone());
        }
        self.store
            .get_by_id(&status.parent_hash)
            .await?
            .ok_or_else(|| SyncError::MissingParent {
                hash: status.hash.clone(),
                parent_hash: status.parent_hash.clone(),
            })
    }

    async fn notify_added(&self, block: &Block) {
        for listener in self.listeners.snapshot().await {
            if let Err(e) = listener.block_added(block).await {
                warn!(height = block.height, error = %e, "Listener failed to handle added block");
            }
        }
    }

    async fn notify_deleted(&self, status: &SyncStatus) -> Result<(), SyncError> {
        for listener in self.listeners.snapshot().await {
            if let Err(e) = listener.block_deleted(status).await {
                warn!(height = status.height, error = %e, "Listener failed to handle deleted block");
                return Err(e.into());
            }
        }
        Ok(())
    }
}
