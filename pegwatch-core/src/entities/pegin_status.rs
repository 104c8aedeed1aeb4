use crate::entities::PeginStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use serde::Serialize;

/// Classified inbound transfer. Written once per `btc_tx_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PeginStatusRecord {
    pub btc_tx_id: String,
    pub status: PeginStatus,
    pub rsk_tx_id: String,
    pub rsk_block_height: i64,
    /// Lowercased receiver address; absent for rejections.
    pub rsk_recipient: Option<String>,
    pub value_in_satoshis: Option<i64>,
    /// Bridge rejection reason code.
    pub reason: Option<String>,
    pub created_on: time::OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct GetPeginStatusById {
    pub btc_tx_id: String,
}

impl Processor<GetPeginStatusById> for DatabaseProcessor {
    type Output = Option<PeginStatusRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPeginStatusById")]
    async fn process(
        &self,
        query: GetPeginStatusById,
    ) -> Result<Option<PeginStatusRecord>, sqlx::Error> {
        sqlx::query_as::<_, PeginStatusRecord>(
            r#"
            SELECT btc_tx_id, status, rsk_tx_id, rsk_block_height, rsk_recipient,
                   value_in_satoshis, reason, created_on
            FROM pegin_status
            WHERE btc_tx_id = $1
            "#,
        )
        .bind(query.btc_tx_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Insert a pegin status.
///
/// Uses ON CONFLICT DO NOTHING so an existing record is never overwritten.
/// Returns whether the row was inserted.
pub struct InsertPeginStatus {
    pub record: PeginStatusRecord,
}

impl Processor<InsertPeginStatus> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertPeginStatus")]
    async fn process(&self, insert: InsertPeginStatus) -> Result<bool, sqlx::Error> {
        let record = insert.record;
        let result = sqlx::query(
            r#"
            INSERT INTO pegin_status
            (btc_tx_id, status, rsk_tx_id, rsk_block_height, rsk_recipient,
             value_in_satoshis, reason, created_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (btc_tx_id) DO NOTHING
            "#,
        )
        .bind(record.btc_tx_id)
        .bind(record.status)
        .bind(record.rsk_tx_id)
        .bind(record.rsk_block_height)
        .bind(record.rsk_recipient)
        .bind(record.value_in_satoshis)
        .bind(record.reason)
        .bind(record.created_on)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct DeletePeginStatus {
    pub btc_tx_id: String,
}

impl Processor<DeletePeginStatus> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeletePeginStatus")]
    async fn process(&self, delete: DeletePeginStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pegin_status WHERE btc_tx_id = $1")
            .bind(delete.btc_tx_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
/// Delete every pegin status produced by a block at the given height.
pub struct DeletePeginStatusesByHeight {
    pub rsk_block_height: i64,
}

impl Processor<DeletePeginStatusesByHeight> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeletePeginStatusesByHeight")]
    async fn process(&self, delete: DeletePeginStatusesByHeight) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pegin_status WHERE rsk_block_height = $1")
            .bind(delete.rsk_block_height)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
