use crate::entities::PegoutStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use serde::Serialize;

const PEGOUT_COLUMNS: &str = "originating_rsk_tx_hash, rsk_tx_hash, rsk_sender_address, status, \
    is_newest_status, rsk_block_height, rsk_block_hash, value_requested_in_satoshis, \
    value_in_satoshis_to_be_received, fee_in_satoshis_to_be_paid, btc_recipient_address, \
    btc_raw_transaction, btc_tx_hash, btc_raw_tx_inputs_hash, batch_pegout_index, \
    batch_pegout_rsk_tx_hash, reason, created_on";

/// One version of an outbound transfer.
///
/// Versions are append-only. Exactly one version per
/// `originating_rsk_tx_hash` carries `is_newest_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PegoutStatusRecord {
    /// Hash of the release request that started this pegout.
    pub originating_rsk_tx_hash: String,
    /// Version key.
    pub rsk_tx_hash: String,
    pub rsk_sender_address: Option<String>,
    pub status: PegoutStatus,
    pub is_newest_status: bool,
    pub rsk_block_height: i64,
    pub rsk_block_hash: String,
    pub value_requested_in_satoshis: Option<i64>,
    pub value_in_satoshis_to_be_received: Option<i64>,
    pub fee_in_satoshis_to_be_paid: Option<i64>,
    pub btc_recipient_address: Option<String>,
    pub btc_raw_transaction: Option<String>,
    pub btc_tx_hash: Option<String>,
    pub btc_raw_tx_inputs_hash: Option<String>,
    pub batch_pegout_index: Option<i32>,
    pub batch_pegout_rsk_tx_hash: Option<String>,
    pub reason: Option<String>,
    pub created_on: time::OffsetDateTime,
}

/// Criteria for listing pegout versions. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PegoutStatusFilter {
    pub originating_rsk_tx_hashes: Option<Vec<String>>,
    /// Empty means any status.
    pub statuses: Vec<PegoutStatus>,
    pub newest_only: bool,
    pub btc_raw_tx_inputs_hash: Option<String>,
    pub max_rsk_block_height: Option<i64>,
}

impl PegoutStatusFilter {
    pub fn matches(&self, record: &PegoutStatusRecord) -> bool {
        self.originating_rsk_tx_hashes
            .as_ref()
            .is_none_or(|hashes| hashes.contains(&record.originating_rsk_tx_hash))
            && (self.statuses.is_empty() || self.statuses.contains(&record.status))
            && (!self.newest_only || record.is_newest_status)
            && self
                .btc_raw_tx_inputs_hash
                .as_ref()
                .is_none_or(|hash| record.btc_raw_tx_inputs_hash.as_ref() == Some(hash))
            && self
                .max_rsk_block_height
                .is_none_or(|height| record.rsk_block_height <= height)
    }
}

#[derive(Debug, Clone)]
pub struct GetPegoutStatusById {
    pub rsk_tx_hash: String,
}

impl Processor<GetPegoutStatusById> for DatabaseProcessor {
    type Output = Option<PegoutStatusRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPegoutStatusById")]
    async fn process(
        &self,
        query: GetPegoutStatusById,
    ) -> Result<Option<PegoutStatusRecord>, sqlx::Error> {
        let sql = format!("SELECT {} FROM pegout_status WHERE rsk_tx_hash = $1", PEGOUT_COLUMNS);
        sqlx::query_as::<_, PegoutStatusRecord>(&sql)
            .bind(query.rsk_tx_hash)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Get the current version of a pegout.
pub struct GetNewestPegoutStatus {
    pub originating_rsk_tx_hash: String,
}

impl Processor<GetNewestPegoutStatus> for DatabaseProcessor {
    type Output = Option<PegoutStatusRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetNewestPegoutStatus")]
    async fn process(
        &self,
        query: GetNewestPegoutStatus,
    ) -> Result<Option<PegoutStatusRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM pegout_status \
             WHERE originating_rsk_tx_hash = $1 AND is_newest_status",
            PEGOUT_COLUMNS
        );
        sqlx::query_as::<_, PegoutStatusRecord>(&sql)
            .bind(query.originating_rsk_tx_hash)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// List pegout versions in insertion order.
pub struct ListPegoutStatuses {
    pub filter: PegoutStatusFilter,
}

impl Processor<ListPegoutStatuses> for DatabaseProcessor {
    type Output = Vec<PegoutStatusRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListPegoutStatuses")]
    async fn process(&self, query: ListPegoutStatuses) -> Result<Vec<PegoutStatusRecord>, sqlx::Error> {
        let filter = query.filter;
        let mut query_builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(format!(
            "SELECT {} FROM pegout_status WHERE TRUE",
            PEGOUT_COLUMNS
        ));

        if let Some(hashes) = filter.originating_rsk_tx_hashes {
            query_builder
                .push(" AND originating_rsk_tx_hash = ANY(")
                .push_bind(hashes)
                .push(")");
        }
        if !filter.statuses.is_empty() {
            query_builder.push(" AND status IN (");
            let mut separated = query_builder.separated(", ");
            for status in filter.statuses {
                separated.push_bind(status);
            }
            separated.push_unseparated(")");
        }
        if filter.newest_only {
            query_builder.push(" AND is_newest_status");
        }
        if let Some(hash) = filter.btc_raw_tx_inputs_hash {
            query_builder
                .push(" AND btc_raw_tx_inputs_hash = ")
                .push_bind(hash);
        }
        if let Some(height) = filter.max_rsk_block_height {
            query_builder
                .push(" AND rsk_block_height <= ")
                .push_bind(height);
        }
        query_builder.push(" ORDER BY id ASC");

        query_builder
            .build_query_as::<PegoutStatusRecord>()
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Insert one version as-is. Returns whether it was inserted.
pub struct InsertPegoutStatus {
    pub record: PegoutStatusRecord,
}

impl Processor<InsertPegoutStatus> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertPegoutStatus")]
    async fn process(&self, insert: InsertPegoutStatus) -> Result<bool, sqlx::Error> {
        let inserted = insert_many_query(vec![insert.record])
            .build()
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(inserted > 0)
    }
}

#[derive(Debug, Clone)]
pub struct DeletePegoutStatus {
    pub rsk_tx_hash: String,
}

impl Processor<DeletePegoutStatus> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeletePegoutStatus")]
    async fn process(&self, delete: DeletePegoutStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pegout_status WHERE rsk_tx_hash = $1")
            .bind(delete.rsk_tx_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Uses QueryBuilder for a bulk insert with ON CONFLICT DO NOTHING, so a
/// version key that already exists is left untouched.
fn insert_many_query(records: Vec<PegoutStatusRecord>) -> sqlx::QueryBuilder<'static, sqlx::Postgres> {
    let mut query_builder =
        sqlx::QueryBuilder::new(format!("INSERT INTO pegout_status ({}) ", PEGOUT_COLUMNS));
    query_builder.push_values(records, |mut b, record| {
        b.push_bind(record.originating_rsk_tx_hash)
            .push_bind(record.rsk_tx_hash)
            .push_bind(record.rsk_sender_address)
            .push_bind(record.status)
            .push_bind(record.is_newest_status)
            .push_bind(record.rsk_block_height)
            .push_bind(record.rsk_block_hash)
            .push_bind(record.value_requested_in_satoshis)
            .push_bind(record.value_in_satoshis_to_be_received)
            .push_bind(record.fee_in_satoshis_to_be_paid)
            .push_bind(record.btc_recipient_address)
            .push_bind(record.btc_raw_transaction)
            .push_bind(record.btc_tx_hash)
            .push_bind(record.btc_raw_tx_inputs_hash)
            .push_bind(record.batch_pegout_index)
            .push_bind(record.batch_pegout_rsk_tx_hash)
            .push_bind(record.reason)
            .push_bind(record.created_on);
    });
    query_builder.push(" ON CONFLICT (rsk_tx_hash) DO NOTHING");
    query_builder
}

impl PegoutStatusRecord {
    /// Clear the newest flag on the superseded versions and insert their
    /// successors.
    ///
    /// Must run inside a transaction so a failure leaves the previous
    /// versions current.
    pub async fn apply_transition_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        superseded: &[String],
        inserted: Vec<PegoutStatusRecord>,
    ) -> Result<u64, sqlx::Error> {
        if !superseded.is_empty() {
            sqlx::query(
                r#"
                UPDATE pegout_status
                SET is_newest_status = FALSE
                WHERE rsk_tx_hash = ANY($1) AND is_newest_status
                "#,
            )
            .bind(superseded)
            .execute(&mut **tx)
            .await?;
        }
        if inserted.is_empty() {
            return Ok(0);
        }
        let result = insert_many_query(inserted).build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    /// Delete every version produced at `rsk_block_height`, then give the
    /// newest flag back to the latest surviving version of each affected
    /// pegout.
    pub async fn delete_by_height_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        rsk_block_height: i64,
    ) -> Result<u64, sqlx::Error> {
        let mut affected: Vec<String> = sqlx::query_scalar(
            r#"
            DELETE FROM pegout_status
            WHERE rsk_block_height = $1
            RETURNING originating_rsk_tx_hash
            "#,
        )
        .bind(rsk_block_height)
        .fetch_all(&mut **tx)
        .await?;
        let deleted = affected.len() as u64;
        if affected.is_empty() {
            return Ok(0);
        }
        affected.sort();
        affected.dedup();

        sqlx::query(
            r#"
            UPDATE pegout_status
            SET is_newest_status = TRUE
            WHERE id IN (
                SELECT DISTINCT ON (originating_rsk_tx_hash) id
                FROM pegout_status
                WHERE originating_rsk_tx_hash = ANY($1)
                ORDER BY originating_rsk_tx_hash, id DESC
            )
            AND NOT EXISTS (
                SELECT 1 FROM pegout_status newest
                WHERE newest.originating_rsk_tx_hash = pegout_status.originating_rsk_tx_hash
                  AND newest.is_newest_status
            )
            "#,
        )
        .bind(&affected)
        .execute(&mut **tx)
        .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(originating: &str, status: PegoutStatus, newest: bool, height: i64) -> PegoutStatusRecord {
        PegoutStatusRecord {
            originating_rsk_tx_hash: originating.to_string(),
            rsk_tx_hash: originating.to_string(),
            rsk_sender_address: None,
            status,
            is_newest_status: newest,
            rsk_block_height: height,
            rsk_block_hash: "0xbb".to_string(),
            value_requested_in_satoshis: None,
            value_in_satoshis_to_be_received: None,
            fee_in_satoshis_to_be_paid: None,
            btc_recipient_address: None,
            btc_raw_transaction: None,
            btc_tx_hash: None,
            btc_raw_tx_inputs_hash: Some("ff".to_string()),
            batch_pegout_index: None,
            batch_pegout_rsk_tx_hash: None,
            reason: None,
            created_on: time::OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_default_filter_matches_everything() {
        let filter = PegoutStatusFilter::default();
        assert!(filter.matches(&record("0x1", PegoutStatus::Received, false, 1)));
    }

    #[test]
    fn test_filter_combines_criteria() {
        let filter = PegoutStatusFilter {
            originating_rsk_tx_hashes: Some(vec!["0x1".to_string()]),
            statuses: vec![PegoutStatus::WaitingForConfirmation],
            newest_only: true,
            btc_raw_tx_inputs_hash: Some("ff".to_string()),
            max_rsk_block_height: Some(10),
        };
        assert!(filter.matches(&record("0x1", PegoutStatus::WaitingForConfirmation, true, 10)));
        assert!(!filter.matches(&record("0x2", PegoutStatus::WaitingForConfirmation, true, 10)));
        assert!(!filter.matches(&record("0x1", PegoutStatus::Received, true, 10)));
        assert!(!filter.matches(&record("0x1", PegoutStatus::WaitingForConfirmation, false, 10)));
        assert!(!filter.matches(&record("0x1", PegoutStatus::WaitingForConfirmation, true, 11)));
    }
}
