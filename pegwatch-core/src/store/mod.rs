//! Persistence seams.
//!
//! The synchronizer and the status processors only see these traits. The
//! production backend is [`postgres::PostgresStore`]; tests use in-memory
//! stores.

pub mod postgres;

use crate::entities::PegoutStatus;
use crate::entities::pegin_status::PeginStatusRecord;
use crate::entities::pegout_status::{PegoutStatusFilter, PegoutStatusRecord};
use crate::entities::sync_status::SyncStatus;
use async_trait::async_trait;
use thiserror::Error;

pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Start/stop hooks of a store.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Make sure the backend is reachable. Failure here is fatal to the
    /// daemon's start.
    async fn start(&self) -> StoreResult<()>;

    async fn stop(&self) -> StoreResult<()>;
}

/// Synchronized blocks, keyed by hash.
#[async_trait]
pub trait SyncStatusStore: Lifecycle {
    async fn get_by_id(&self, hash: &str) -> StoreResult<Option<SyncStatus>>;

    /// Highest persisted block.
    async fn get_best(&self) -> StoreResult<Option<SyncStatus>>;

    async fn set(&self, status: SyncStatus) -> StoreResult<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, hash: &str) -> StoreResult<bool>;
}

/// Inbound transfer statuses, keyed by bitcoin transaction id.
#[async_trait]
pub trait PeginStatusStore: Lifecycle {
    async fn get_by_id(&self, btc_tx_id: &str) -> StoreResult<Option<PeginStatusRecord>>;

    /// Insert unless a record with the same key exists. Returns whether the
    /// record was written.
    async fn set(&self, record: PeginStatusRecord) -> StoreResult<bool>;

    async fn delete(&self, btc_tx_id: &str) -> StoreResult<bool>;

    /// Remove every record produced at the given ledger height.
    async fn delete_by_rsk_block_height(&self, rsk_block_height: i64) -> StoreResult<u64>;
}

/// Versioned outbound transfer statuses, keyed by `rsk_tx_hash`.
#[async_trait]
pub trait PegoutStatusStore: Lifecycle {
    async fn get_by_id(&self, rsk_tx_hash: &str) -> StoreResult<Option<PegoutStatusRecord>>;

    /// Current version of a pegout.
    async fn get_last_by_originating_rsk_tx_hash(
        &self,
        originating_rsk_tx_hash: &str,
    ) -> StoreResult<Option<PegoutStatusRecord>>;

    /// Versions matching `filter`, oldest first.
    async fn get_many(&self, filter: PegoutStatusFilter) -> StoreResult<Vec<PegoutStatusRecord>>;

    /// Current versions in one of `statuses` spending the given inputs.
    async fn get_many_by_btc_raw_tx_inputs_hash(
        &self,
        btc_raw_tx_inputs_hash: &str,
        statuses: &[PegoutStatus],
    ) -> StoreResult<Vec<PegoutStatusRecord>> {
        self.get_many(PegoutStatusFilter {
            statuses: statuses.to_vec(),
            newest_only: true,
            btc_raw_tx_inputs_hash: Some(btc_raw_tx_inputs_hash.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Atomically supersede the versions keyed by `superseded` and insert
    /// `inserted`.
    async fn apply_transition(
        &self,
        superseded: Vec<String>,
        inserted: Vec<PegoutStatusRecord>,
    ) -> StoreResult<()>;

    /// Insert a version as-is unless its key exists.
    async fn set(&self, record: PegoutStatusRecord) -> StoreResult<bool>;

    async fn delete(&self, rsk_tx_hash: &str) -> StoreResult<bool>;

    /// Remove every version produced at the given ledger height and make the
    /// latest surviving version of each affected pegout current again.
    async fn delete_by_rsk_block_height(&self, rsk_block_height: i64) -> StoreResult<u64>;
}
