//! PostgreSQL backend for every store.

use super::{
    Lifecycle, PeginStatusStore, PegoutStatusStore, StoreResult, SyncStatusStore,
};
use crate::entities::pegin_status::{
    DeletePeginStatus, DeletePeginStatusesByHeight, GetPeginStatusById, InsertPeginStatus,
    PeginStatusRecord,
};
use crate::entities::pegout_status::{
    DeletePegoutStatus, GetNewestPegoutStatus, GetPegoutStatusById, InsertPegoutStatus,
    ListPegoutStatuses, PegoutStatusFilter, PegoutStatusRecord,
};
use crate::entities::sync_status::{
    DeleteSyncStatus, GetBestSyncStatus, GetSyncStatusByHash, SyncStatus, UpsertSyncStatus,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    db: DatabaseProcessor,
}

impl PostgresStore {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Lifecycle for PostgresStore {
    async fn start(&self) -> StoreResult<()> {
        self.db.ping().await?;
        debug!("Database store reachable");
        Ok(())
    }

    // The pool is owned by the server and closed there.
    async fn stop(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SyncStatusStore for PostgresStore {
    async fn get_by_id(&self, hash: &str) -> StoreResult<Option<SyncStatus>> {
        Ok(self
            .db
            .process(GetSyncStatusByHash {
                hash: hash.to_string(),
            })
            .await?)
    }

    async fn get_best(&self) -> StoreResult<Option<SyncStatus>> {
        Ok(self.db.process(GetBestSyncStatus).await?)
    }

    async fn set(&self, status: SyncStatus) -> StoreResult<()> {
        Ok(self.db.process(UpsertSyncStatus { status }).await?)
    }

    async fn delete(&self, hash: &str) -> StoreResult<bool> {
        Ok(self
            .db
            .process(DeleteSyncStatus {
                hash: hash.to_string(),
            })
            .await?)
    }
}

#[async_trait]
impl PeginStatusStore for PostgresStore {
    async fn get_by_id(&self, btc_tx_id: &str) -> StoreResult<Option<PeginStatusRecord>> {
        Ok(self
            .db
            .process(GetPeginStatusById {
                btc_tx_id: btc_tx_id.to_string(),
            })
            .await?)
    }

    async fn set(&self, record: PeginStatusRecord) -> StoreResult<bool> {
        Ok(self.db.process(InsertPeginStatus { record }).await?)
    }

    async fn delete(&self, btc_tx_id: &str) -> StoreResult<bool> {
        Ok(self
            .db
            .process(DeletePeginStatus {
                btc_tx_id: btc_tx_id.to_string(),
            })
            .await?)
    }

    async fn delete_by_rsk_block_height(&self, rsk_block_height: i64) -> StoreResult<u64> {
        Ok(self
            .db
            .process(DeletePeginStatusesByHeight { rsk_block_height })
            .await?)
    }
}

#[async_trait]
impl PegoutStatusStore for PostgresStore {
    async fn get_by_id(&self, rsk_tx_hash: &str) -> StoreResult<Option<PegoutStatusRecord>> {
        Ok(self
            .db
            .process(GetPegoutStatusById {
                rsk_tx_hash: rsk_tx_hash.to_string(),
            })
            .await?)
    }

    async fn get_last_by_originating_rsk_tx_hash(
        &self,
        originating_rsk_tx_hash: &str,
    ) -> StoreResult<Option<PegoutStatusRecord>> {
        Ok(self
            .db
            .process(GetNewestPegoutStatus {
                originating_rsk_tx_hash: originating_rsk_tx_hash.to_string(),
            })
            .await?)
    }

    async fn get_many(&self, filter: PegoutStatusFilter) -> StoreResult<Vec<PegoutStatusRecord>> {
        Ok(self.db.process(ListPegoutStatuses { filter }).await?)
    }

    async fn apply_transition(
        &self,
        superseded: Vec<String>,
        inserted: Vec<PegoutStatusRecord>,
    ) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        PegoutStatusRecord::apply_transition_tx(&mut tx, &superseded, inserted).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set(&self, record: PegoutStatusRecord) -> StoreResult<bool> {
        Ok(self.db.process(InsertPegoutStatus { record }).await?)
    }

    async fn delete(&self, rsk_tx_hash: &str) -> StoreResult<bool> {
        Ok(self
            .db
            .process(DeletePegoutStatus {
                rsk_tx_hash: rsk_tx_hash.to_string(),
            })
            .await?)
    }

    async fn delete_by_rsk_block_height(&self, rsk_block_height: i64) -> StoreResult<u64> {
        let mut tx = self.db.begin().await?;
        let deleted = PegoutStatusRecord::delete_by_height_tx(&mut tx, rsk_block_height).await?;
        tx.commit().await?;
        Ok(deleted)
    }
}
