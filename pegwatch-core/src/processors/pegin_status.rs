//! PeginStatusProcessor.
//!
//! Classifies `registerBtcTransaction` calls by the events they emitted and
//! records one status per bitcoin transaction. An existing status is never
//! overwritten.

use super::ProcessorError;
use super::publisher::BridgeTxSubscriber;
use crate::bridge::{BridgeDataFilter, BridgeEvent, BridgeMethod, BridgeTransaction};
use crate::entities::PeginStatus;
use crate::entities::pegin_status::PeginStatusRecord;
use crate::store::PeginStatusStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PeginStatusProcessor {
    store: Arc<dyn PeginStatusStore>,
}

impl PeginStatusProcessor {
    pub fn new(store: Arc<dyn PeginStatusStore>) -> Self {
        Self { store }
    }
}

struct Classification {
    btc_tx_id: String,
    status: PeginStatus,
    rsk_recipient: Option<String>,
    value_in_satoshis: Option<i64>,
    reason: Option<String>,
}

fn find<'a, T>(
    tx: &'a BridgeTransaction,
    pick: impl Fn(&'a BridgeEvent) -> Option<T>,
) -> Option<T> {
    tx.events.iter().find_map(pick)
}

/// First matching rule wins:
///
/// | events                                | status             |
/// |---------------------------------------|--------------------|
/// | `lock_btc`                            | LOCKED             |
/// | `pegin_btc`                           | LOCKED             |
/// | `rejected_pegin` + `release_requested`| REJECTED_REFUND    |
/// | `rejected_pegin` + `unrefundable_pegin`| REJECTED_NO_REFUND |
fn classify(tx: &BridgeTransaction) -> Option<Classification> {
    let locked = find(tx, |event| match event {
        BridgeEvent::LockBtc { receiver, btc_tx_hash, amount, .. } => {
            Some((receiver, btc_tx_hash, *amount))
        }
        _ => None,
    })
    .or_else(|| {
        find(tx, |event| match event {
            BridgeEvent::PeginBtc { receiver, btc_tx_hash, amount, .. } => {
                Some((receiver, btc_tx_hash, *amount))
            }
            _ => None,
        })
    });
    if let Some((receiver, btc_tx_hash, amount)) = locked {
        return Some(Classification {
            btc_tx_id: btc_tx_hash.clone(),
            status: PeginStatus::Locked,
            rsk_recipient: Some(receiver.to_lowercase()),
            value_in_satoshis: Some(amount),
            reason: None,
        });
    }

    let (btc_tx_hash, reason) = find(tx, |event| match event {
        BridgeEvent::RejectedPegin { btc_tx_hash, reason } => Some((btc_tx_hash, reason)),
        _ => None,
    })?;
    let status = if tx.has_event("release_requested") {
        PeginStatus::RejectedRefund
    } else if tx.has_event("unrefundable_pegin") {
        PeginStatus::RejectedNoRefund
    } else {
        warn!(tx = %tx.tx_hash, btc_tx = %btc_tx_hash, "Rejected pegin without refund outcome");
        return None;
    };
    Some(Classification {
        btc_tx_id: btc_tx_hash.clone(),
        status,
        rsk_recipient: None,
        value_in_satoshis: None,
        reason: Some(reason.clone()),
    })
}

#[async_trait]
impl BridgeTxSubscriber for PeginStatusProcessor {
    fn name(&self) -> &'static str {
        "pegin-status"
    }

    fn filters(&self) -> Vec<BridgeDataFilter> {
        vec![BridgeDataFilter::Method(BridgeMethod::RegisterBtcTransaction)]
    }

    async fn process(&self, tx: &BridgeTransaction) -> Result<(), ProcessorError> {
        let Some(classification) = classify(tx) else {
            debug!(tx = %tx.tx_hash, "No pegin outcome in transaction");
            return Ok(());
        };

        if self.store.get_by_id(&classification.btc_tx_id).await?.is_some() {
            debug!(btc_tx = %classification.btc_tx_id, "Pegin status already recorded");
            return Ok(());
        }

        let record = PeginStatusRecord {
            btc_tx_id: classification.btc_tx_id,
            status: classification.status,
            rsk_tx_id: tx.tx_hash.clone(),
            rsk_block_height: tx.block_number,
            rsk_recipient: classification.rsk_recipient,
            value_in_satoshis: classification.value_in_satoshis,
            reason: classification.reason,
            created_on: tx.created_on,
        };
        info!(
            btc_tx = %record.btc_tx_id,
            status = ?record.status,
            height = record.rsk_block_height,
            "Recording pegin status"
        );
        self.store.set(record).await?;
        Ok(())
    }
}
