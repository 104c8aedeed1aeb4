//! Processors of the synchronization pipeline.
//!
//! - `ChainSynchronizer`: reconciles persisted blocks with the node head,
//!   emits `block_deleted` / `block_added`
//! - `SyncDaemon`: drives the synchronizer on a timer and wires its
//!   notifications to the publisher and the status stores
//! - `BridgeTransactionPublisher`: receives added blocks, offers bridge
//!   transactions to subscribers
//! - `PeginStatusProcessor`, `PegoutStatusProcessor`: subscribers deriving
//!   transfer statuses

pub mod chain_sync;
pub mod daemon;
pub mod pegin_status;
pub mod pegout_status;
pub mod publisher;

pub use chain_sync::{ChainSynchronizer, SyncError, SyncReport};
pub use daemon::{DaemonError, SyncDaemon};
pub use pegin_status::PeginStatusProcessor;
pub use pegout_status::PegoutStatusProcessor;
pub use publisher::{BridgeTransactionPublisher, BridgeTxSubscriber};

use crate::bridge::state::BridgeStateError;
use crate::node::NodeError;
use crate::store::StoreError;
use crate::utils::btc::BtcTxError;
use thiserror::Error;

/// Errors raised while a subscriber processes a bridge transaction.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("bridge state error: {0}")]
    BridgeState(#[from] BridgeStateError),

    #[error("bitcoin transaction error: {0}")]
    BtcTx(#[from] BtcTxError),
}
