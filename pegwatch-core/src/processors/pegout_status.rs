//! PegoutStatusProcessor.
//!
//! Maintains the versioned pegout ledger. Every state change supersedes the
//! current version of a pegout and appends a new one, atomically.
//!
//! Lifecycle:
//!
//! ```text
//! RECEIVED -> WAITING_FOR_CONFIRMATION -> WAITING_FOR_SIGNATURE -> SIGNED
//!          \                           \_________________________/
//!           REJECTED
//! ```
//!
//! Version keys are deterministic so a re-delivered transaction is a no-op:
//! the request transaction hash for the first version, `<tx>_<index>` for
//! batch items and `<tx>_<originating tx>` for every other transition.

use super::ProcessorError;
use super::publisher::BridgeTxSubscriber;
use crate::bridge::state::{BridgeState, BridgeStateSource, PendingPegout};
use crate::bridge::{BridgeDataFilter, BridgeEvent, BridgeMethod, BridgeTransaction};
use crate::config::PegoutConfig;
use crate::entities::PegoutStatus;
use crate::entities::pegout_status::{PegoutStatusFilter, PegoutStatusRecord};
use crate::store::PegoutStatusStore;
use crate::utils::btc;
use async_trait::async_trait;
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PegoutStatusProcessor {
    store: Arc<dyn PegoutStatusStore>,
    bridge_state: Arc<dyn BridgeStateSource>,
    config: PegoutConfig,
}

/// A pending bridge pegout together with its parsed transaction.
struct ResolvedPegout {
    raw: String,
    tx: bitcoin::Transaction,
    txid: String,
    inputs_hash: String,
}

/// Versions a single transition supersedes and appends.
#[derive(Default)]
struct Transition {
    superseded: Vec<String>,
    inserted: Vec<PegoutStatusRecord>,
}

impl Transition {
    fn push(&mut self, current: &PegoutStatusRecord, next: PegoutStatusRecord) {
        self.superseded.push(current.rsk_tx_hash.clone());
        self.inserted.push(next);
    }

    fn is_empty(&self) -> bool {
        self.inserted.is_empty()
    }
}

fn version_key(tx: &BridgeTransaction, suffix: impl std::fmt::Display) -> String {
    format!("{}_{}", tx.tx_hash, suffix)
}

/// Next version of `current`, produced by `tx`.
fn successor(
    current: &PegoutStatusRecord,
    tx: &BridgeTransaction,
    rsk_tx_hash: String,
    status: PegoutStatus,
) -> PegoutStatusRecord {
    PegoutStatusRecord {
        rsk_tx_hash,
        status,
        is_newest_status: true,
        rsk_block_height: tx.block_number,
        rsk_block_hash: tx.block_hash.clone(),
        created_on: tx.created_on,
        ..current.clone()
    }
}

fn first_version(
    tx: &BridgeTransaction,
    status: PegoutStatus,
    sender: &str,
    amount: i64,
) -> PegoutStatusRecord {
    PegoutStatusRecord {
        originating_rsk_tx_hash: tx.tx_hash.clone(),
        rsk_tx_hash: tx.tx_hash.clone(),
        rsk_sender_address: Some(sender.to_lowercase()),
        status,
        is_newest_status: true,
        rsk_block_height: tx.block_number,
        rsk_block_hash: tx.block_hash.clone(),
        value_requested_in_satoshis: Some(amount),
        value_in_satoshis_to_be_received: None,
        fee_in_satoshis_to_be_paid: None,
        btc_recipient_address: None,
        btc_raw_transaction: None,
        btc_tx_hash: None,
        btc_raw_tx_inputs_hash: None,
        batch_pegout_index: None,
        batch_pegout_rsk_tx_hash: None,
        reason: None,
        created_on: tx.created_on,
    }
}

impl PegoutStatusProcessor {
    pub fn new(
        store: Arc<dyn PegoutStatusStore>,
        bridge_state: Arc<dyn BridgeStateSource>,
        config: PegoutConfig,
    ) -> Self {
        Self {
            store,
            bridge_state,
            config,
        }
    }

    async fn is_recorded(&self, rsk_tx_hash: &str) -> Result<bool, ProcessorError> {
        Ok(self.store.get_by_id(rsk_tx_hash).await?.is_some())
    }

    /// Bridge state, fetched at most once per transaction.
    async fn bridge_state<'a>(
        &self,
        cache: &'a mut Option<BridgeState>,
    ) -> Result<&'a BridgeState, ProcessorError> {
        let state = match cache.take() {
            Some(state) => state,
            None => self.bridge_state.get_bridge_state().await?,
        };
        Ok(cache.insert(state))
    }

    /// Find the pending bridge pegout with the given bitcoin txid, falling
    /// back to the ledger transaction that created it.
    fn resolve_pending(
        state: &BridgeState,
        btc_tx_hash: &str,
        rsk_tx_hashes: &[&str],
    ) -> Option<ResolvedPegout> {
        let parsed = |pegout: &PendingPegout| -> Option<ResolvedPegout> {
            match btc::parse_raw_transaction(&pegout.btc_raw_tx) {
                Ok(tx) => Some(ResolvedPegout {
                    raw: pegout.btc_raw_tx.clone(),
                    txid: btc::txid(&tx),
                    inputs_hash: btc::inputs_fingerprint(&tx),
                    tx,
                }),
                Err(e) => {
                    warn!(rsk_tx = %pegout.rsk_tx_hash, error = %e, "Unparseable pending pegout");
                    None
                }
            }
        };

        let pending = &state.pegouts_waiting_for_confirmations;
        pending
            .iter()
            .filter_map(parsed)
            .find(|resolved| resolved.txid.eq_ignore_ascii_case(btc_tx_hash))
            .or_else(|| {
                rsk_tx_hashes
                    .iter()
                    .find_map(|hash| state.find_by_rsk_tx_hash(hash))
                    .and_then(parsed)
            })
    }

    async fn on_release_request_received(
        &self,
        tx: &BridgeTransaction,
        sender: &str,
        btc_destination_address: &str,
        amount: i64,
    ) -> Result<(), ProcessorError> {
        if self.is_recorded(&tx.tx_hash).await? {
            debug!(tx = %tx.tx_hash, "Release request already recorded");
            return Ok(());
        }
        let record = PegoutStatusRecord {
            btc_recipient_address: Some(btc_destination_address.to_string()),
            ..first_version(tx, PegoutStatus::Received, sender, amount)
        };
        info!(tx = %tx.tx_hash, amount, "Pegout received");
        self.store.apply_transition(vec![], vec![record]).await?;
        Ok(())
    }

    async fn on_release_request_rejected(
        &self,
        tx: &BridgeTransaction,
        sender: &str,
        amount: i64,
        reason: &str,
    ) -> Result<(), ProcessorError> {
        if self.is_recorded(&tx.tx_hash).await? {
            debug!(tx = %tx.tx_hash, "Release rejection already recorded");
            return Ok(());
        }
        let record = PegoutStatusRecord {
            reason: Some(reason.to_string()),
            ..first_version(tx, PegoutStatus::Rejected, sender, amount)
        };
        info!(tx = %tx.tx_hash, reason, "Pegout rejected");
        self.store.apply_transition(vec![], vec![record]).await?;
        Ok(())
    }

    async fn on_release_requested(
        &self,
        tx: &BridgeTransaction,
        originating: &str,
        btc_tx_hash: &str,
        state: &mut Option<BridgeState>,
    ) -> Result<(), ProcessorError> {
        let key = version_key(tx, originating);
        if self.is_recorded(&key).await? {
            return Ok(());
        }
        let Some(current) = self
            .store
            .get_last_by_originating_rsk_tx_hash(originating)
            .await?
        else {
            warn!(originating, tx = %tx.tx_hash, "Release requested for unknown pegout");
            return Ok(());
        };
        if current.status != PegoutStatus::Received {
            debug!(originating, status = %current.status, "Pegout already past RECEIVED");
            return Ok(());
        }

        let state = self.bridge_state(state).await?;
        let mut next = successor(&current, tx, key, PegoutStatus::WaitingForConfirmation);
        next.btc_tx_hash = Some(btc_tx_hash.to_string());
        match Self::resolve_pending(state, btc_tx_hash, &[originating, tx.tx_hash.as_str()]) {
            Some(pending) => {
                next.value_in_satoshis_to_be_received = current
                    .btc_recipient_address
                    .as_deref()
                    .and_then(|address| btc::value_paid_to(&pending.tx, address, self.config.network));
                attach_pending(&mut next, pending);
            }
            None => warn!(originating, btc_tx = btc_tx_hash, "Pending pegout not found in bridge state"),
        }

        info!(originating, btc_tx = btc_tx_hash, "Pegout waiting for confirmation");
        let mut transition = Transition::default();
        transition.push(&current, next);
        self.commit(transition).await
    }

    async fn on_batch_pegout_created(
        &self,
        tx: &BridgeTransaction,
        btc_tx_hash: &str,
        release_rsk_tx_hashes: &[String],
        state: &mut Option<BridgeState>,
    ) -> Result<(), ProcessorError> {
        let state = self.bridge_state(state).await?;
        let pending = Self::resolve_pending(state, btc_tx_hash, &[tx.tx_hash.as_str()]);
        if pending.is_none() {
            warn!(btc_tx = btc_tx_hash, tx = %tx.tx_hash, "Batch pegout not found in bridge state");
        }

        let mut transition = Transition::default();
        for (index, originating) in release_rsk_tx_hashes.iter().unique().enumerate() {
            let key = version_key(tx, index);
            if self.is_recorded(&key).await? {
                continue;
            }
            let Some(current) = self
                .store
                .get_last_by_originating_rsk_tx_hash(originating)
                .await?
            else {
                warn!(originating = %originating, index, "Batched release for unknown pegout");
                continue;
            };
            if current.status != PegoutStatus::Received {
                debug!(originating = %originating, index, status = %current.status, "Batched pegout already past RECEIVED");
                continue;
            }

            let mut next = successor(&current, tx, key, PegoutStatus::WaitingForConfirmation);
            next.btc_tx_hash = Some(btc_tx_hash.to_string());
            next.batch_pegout_index = i32::try_from(index).ok();
            next.batch_pegout_rsk_tx_hash = Some(tx.tx_hash.clone());
            if let Some(pending) = &pending {
                next.value_in_satoshis_to_be_received = btc::output_value(&pending.tx, index);
                next.btc_raw_transaction = Some(pending.raw.clone());
                next.btc_raw_tx_inputs_hash = Some(pending.inputs_hash.clone());
                next.fee_in_satoshis_to_be_paid = fee(&next);
            }
            transition.push(&current, next);
        }

        info!(
            btc_tx = btc_tx_hash,
            items = transition.inserted.len(),
            "Batch pegout waiting for confirmation"
        );
        self.commit(transition).await
    }

    /// Promote pegouts that have waited long enough and are no longer held
    /// by the bridge as unconfirmed.
    async fn on_update_collections(
        &self,
        tx: &BridgeTransaction,
        state: &mut Option<BridgeState>,
    ) -> Result<(), ProcessorError> {
        let candidates = self
            .store
            .get_many(PegoutStatusFilter {
                statuses: vec![PegoutStatus::WaitingForConfirmation],
                newest_only: true,
                max_rsk_block_height: Some(tx.block_number - self.config.confirmations_threshold),
                ..Default::default()
            })
            .await?;
        if candidates.is_empty() {
            return Ok(());
        }

        let state = self.bridge_state(state).await?;
        let pending: HashSet<String> = state
            .pegouts_waiting_for_confirmations
            .iter()
            .filter_map(|pegout| btc::parse_raw_transaction(&pegout.btc_raw_tx).ok())
            .map(|parsed| btc::txid(&parsed).to_lowercase())
            .collect();

        let mut transition = Transition::default();
        for current in candidates {
            let Some(btc_tx_hash) = current.btc_tx_hash.as_deref() else {
                continue;
            };
            if pending.contains(&btc_tx_hash.to_lowercase()) {
                continue;
            }
            let key = version_key(tx, &current.originating_rsk_tx_hash);
            if self.is_recorded(&key).await? {
                continue;
            }
            let next = successor(&current, tx, key, PegoutStatus::WaitingForSignature);
            transition.push(&current, next);
        }

        if !transition.is_empty() {
            info!(count = transition.inserted.len(), "Pegouts waiting for signature");
        }
        self.commit(transition).await
    }

    async fn on_release_btc(
        &self,
        tx: &BridgeTransaction,
        btc_raw_transaction: &str,
    ) -> Result<(), ProcessorError> {
        let signed = btc::parse_raw_transaction(btc_raw_transaction)?;
        let inputs_hash = btc::inputs_fingerprint(&signed);
        let txid = btc::txid(&signed);

        let matched = self
            .store
            .get_many_by_btc_raw_tx_inputs_hash(
                &inputs_hash,
                &[
                    PegoutStatus::WaitingForConfirmation,
                    PegoutStatus::WaitingForSignature,
                ],
            )
            .await?;
        if matched.is_empty() {
            debug!(btc_tx = %txid, "Released transaction matches no pegout");
            return Ok(());
        }

        let mut transition = Transition::default();
        for current in matched.iter().sorted_by_key(|record| record.batch_pegout_index) {
            let key = version_key(tx, &current.originating_rsk_tx_hash);
            if self.is_recorded(&key).await? {
                continue;
            }
            let mut next = successor(current, tx, key, PegoutStatus::Signed);
            next.btc_raw_transaction = Some(btc_raw_transaction.to_string());
            next.btc_tx_hash = Some(txid.clone());
            transition.push(current, next);
        }

        info!(btc_tx = %txid, count = transition.inserted.len(), "Pegouts signed");
        self.commit(transition).await
    }

    async fn commit(&self, transition: Transition) -> Result<(), ProcessorError> {
        if transition.is_empty() {
            return Ok(());
        }
        self.store
            .apply_transition(transition.superseded, transition.inserted)
            .await?;
        Ok(())
    }
}

fn attach_pending(next: &mut PegoutStatusRecord, pending: ResolvedPegout) {
    next.btc_raw_tx_inputs_hash = Some(pending.inputs_hash);
    next.btc_raw_transaction = Some(pending.raw);
    next.fee_in_satoshis_to_be_paid = fee(next);
}

fn fee(record: &PegoutStatusRecord) -> Option<i64> {
    let requested = record.value_requested_in_satoshis?;
    let received = record.value_in_satoshis_to_be_received?;
    requested.checked_sub(received)
}

#[async_trait]
impl BridgeTxSubscriber for PegoutStatusProcessor {
    fn name(&self) -> &'static str {
        "pegout-status"
    }

    fn filters(&self) -> Vec<BridgeDataFilter> {
        vec![
            BridgeDataFilter::Method(BridgeMethod::UpdateCollections),
            BridgeDataFilter::Method(BridgeMethod::AddSignature),
            BridgeDataFilter::Any,
        ]
    }

    async fn process(&self, tx: &BridgeTransaction) -> Result<(), ProcessorError> {
        let mut state = None;
        let batching = self.config.batch_pegout_enabled;
        let has_batch = batching && tx.has_event("batch_pegout_created");

        for event in &tx.events {
            match event {
                BridgeEvent::ReleaseRequestReceived {
                    sender,
                    btc_destination_address,
                    amount,
                } => {
                    self.on_release_request_received(tx, sender, btc_destination_address, *amount)
                        .await?
                }
                BridgeEvent::ReleaseRequestRejected {
                    sender,
                    amount,
                    reason,
                } => {
                    self.on_release_request_rejected(tx, sender, *amount, reason)
                        .await?
                }
                BridgeEvent::ReleaseRequested {
                    rsk_tx_hash,
                    btc_tx_hash,
                    ..
                } if !has_batch => {
                    self.on_release_requested(tx, rsk_tx_hash, btc_tx_hash, &mut state)
                        .await?
                }
                BridgeEvent::BatchPegoutCreated {
                    btc_tx_hash,
                    release_rsk_tx_hashes,
                } if batching => {
                    self.on_batch_pegout_created(tx, btc_tx_hash, release_rsk_tx_hashes, &mut state)
                        .await?
                }
                _ => {}
            }
        }

        if tx.method == Some(BridgeMethod::UpdateCollections) || tx.has_event("update_collections") {
            self.on_update_collections(tx, &mut state).await?;
        }

        for event in &tx.events {
            if let BridgeEvent::ReleaseBtc {
                btc_raw_transaction,
                ..
            } = event
            {
                self.on_release_btc(tx, btc_raw_transaction).await?;
            }
        }
        Ok(())
    }
}
