use crate::framework::DatabaseProcessor;
use crate::node::Block;
use kanau::processor::Processor;
use serde::Serialize;

/// One synchronized block.
///
/// Persisted rows form a single chain: every `parent_hash` points at another
/// row or at the configured default block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SyncStatus {
    pub height: i64,
    pub hash: String,
    pub parent_hash: String,
    pub last_synced_on: time::OffsetDateTime,
}

impl SyncStatus {
    pub fn new(height: i64, hash: impl Into<String>, parent_hash: impl Into<String>) -> Self {
        Self {
            height,
            hash: hash.into(),
            parent_hash: parent_hash.into(),
            last_synced_on: time::OffsetDateTime::now_utc(),
        }
    }

    pub fn from_block(block: &Block) -> Self {
        Self::new(block.height, block.hash.clone(), block.parent_hash.clone())
    }
}

#[derive(Debug, Clone)]
/// Get the highest synchronized block.
pub struct GetBestSyncStatus;

impl Processor<GetBestSyncStatus> for DatabaseProcessor {
    type Output = Option<SyncStatus>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBestSyncStatus")]
    async fn process(&self, _query: GetBestSyncStatus) -> Result<Option<SyncStatus>, sqlx::Error> {
        sqlx::query_as::<_, SyncStatus>(
            r#"
            SELECT height, hash, parent_hash, last_synced_on
            FROM sync_status
            ORDER BY height DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetSyncStatusByHash {
    pub hash: String,
}

impl Processor<GetSyncStatusByHash> for DatabaseProcessor {
    type Output = Option<SyncStatus>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetSyncStatusByHash")]
    async fn process(&self, query: GetSyncStatusByHash) -> Result<Option<SyncStatus>, sqlx::Error> {
        sqlx::query_as::<_, SyncStatus>(
            r#"
            SELECT height, hash, parent_hash, last_synced_on
            FROM sync_status
            WHERE hash = $1
            "#,
        )
        .bind(query.hash)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Insert a synchronized block, refreshing `last_synced_on` if it is
/// already present.
pub struct UpsertSyncStatus {
    pub status: SyncStatus,
}

impl Processor<UpsertSyncStatus> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertSyncStatus")]
    async fn process(&self, upsert: UpsertSyncStatus) -> Result<(), sqlx::Error> {
        let status = upsert.status;
        sqlx::query(
            r#"
            INSERT INTO sync_status (hash, height, parent_hash, last_synced_on)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (hash) DO UPDATE
            SET height = EXCLUDED.height,
                parent_hash = EXCLUDED.parent_hash,
                last_synced_on = EXCLUDED.last_synced_on
            "#,
        )
        .bind(status.hash)
        .bind(status.height)
        .bind(status.parent_hash)
        .bind(status.last_synced_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Delete a synchronized block. Returns whether a row was removed.
pub struct DeleteSyncStatus {
    pub hash: String,
}

impl Processor<DeleteSyncStatus> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteSyncStatus")]
    async fn process(&self, delete: DeleteSyncStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sync_status WHERE hash = $1")
            .bind(delete.hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
