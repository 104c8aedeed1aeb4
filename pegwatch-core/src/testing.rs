//! In-memory fakes of the node, the stores and the bridge state, plus
//! builders for chain data.

use crate::bridge::state::{BridgeState, BridgeStateError, BridgeStateSource, PendingPegout};
use crate::bridge::{BRIDGE_ADDRESS, BridgeDataFilter, BridgeEvent, BridgeMethod, BridgeTransaction};
use crate::entities::pegin_status::PeginStatusRecord;
use crate::entities::pegout_status::{PegoutStatusFilter, PegoutStatusRecord};
use crate::entities::sync_status::SyncStatus;
use crate::events::{ChainListener, ListenerError};
use crate::node::{Block, BlockTag, LedgerNode, NodeError, NodeResult, Transaction, TransactionReceipt};
use crate::processors::{BridgeTxSubscriber, ProcessorError};
use crate::store::{
    Lifecycle, PeginStatusStore, PegoutStatusStore, StoreError, StoreResult, SyncStatusStore,
};
use async_trait::async_trait;
use bitcoin::hashes::Hash;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn block(height: i64, hash: &str, parent_hash: &str) -> Block {
    Block {
        height,
        hash: hash.to_string(),
        parent_hash: parent_hash.to_string(),
        transactions: vec![],
    }
}

pub fn transaction(hash: &str, height: i64, to: Option<&str>, data: &str) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        block_hash: format!("0xb{}", height),
        block_height: height,
        to: to.map(str::to_string),
        data: data.to_string(),
        created_on: created_on(height),
    }
}

/// Call data invoking `method` without arguments.
pub fn bridge_call(method: BridgeMethod) -> String {
    format!("0x{}", hex::encode(method.selector()))
}

pub fn bridge_tx(
    hash: &str,
    height: i64,
    method: Option<BridgeMethod>,
    events: Vec<BridgeEvent>,
) -> BridgeTransaction {
    BridgeTransaction {
        tx_hash: hash.to_string(),
        block_hash: format!("0xb{}", height),
        block_number: height,
        created_on: created_on(height),
        to: BRIDGE_ADDRESS.to_string(),
        data: method.map(bridge_call).unwrap_or_else(|| "0x".to_string()),
        method,
        events,
    }
}

fn created_on(height: i64) -> time::OffsetDateTime {
    time::OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(height * 30)
}

fn p2pkh(byte: u8) -> bitcoin::Address {
    bitcoin::Address::p2pkh(
        bitcoin::PubkeyHash::from_byte_array([byte; 20]),
        bitcoin::Network::Testnet,
    )
}

pub fn testnet_address(byte: u8) -> String {
    p2pkh(byte).to_string()
}

/// Bitcoin transaction spending output `i` of a transaction whose id is
/// `[prevouts[i]; 32]`, paying `value` to `testnet_address(byte)` for each
/// `(byte, value)` output. Signed transactions carry a non-empty script sig.
pub fn btc_transaction(prevouts: &[u8], outputs: &[(u8, u64)], signed: bool) -> bitcoin::Transaction {
    let script_sig = if signed {
        bitcoin::ScriptBuf::from_bytes(vec![0x51])
    } else {
        bitcoin::ScriptBuf::new()
    };
    bitcoin::Transaction {
        version: bitcoin::transaction::Version::TWO,
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: prevouts
            .iter()
            .enumerate()
            .map(|(vout, byte)| bitcoin::TxIn {
                previous_output: bitcoin::OutPoint::new(
                    bitcoin::Txid::from_byte_array([*byte; 32]),
                    vout as u32,
                ),
                script_sig: script_sig.clone(),
                sequence: bitcoin::Sequence::MAX,
                witness: bitcoin::Witness::new(),
            })
            .collect(),
        output: outputs
            .iter()
            .map(|(byte, value)| bitcoin::TxOut {
                value: bitcoin::Amount::from_sat(*value),
                script_pubkey: p2pkh(*byte).script_pubkey(),
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Ledger node
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockLedgerNode {
    chain: Mutex<BTreeMap<i64, Block>>,
    decoded: Mutex<HashMap<String, BridgeTransaction>>,
    undecodable: Mutex<HashSet<String>>,
    failing: AtomicBool,
    block_calls: AtomicUsize,
}

impl MockLedgerNode {
    pub fn with_chain(blocks: Vec<Block>) -> Self {
        let node = Self::default();
        node.replace_chain(blocks);
        node
    }

    pub fn replace_chain(&self, blocks: Vec<Block>) {
        let mut chain = self.chain.lock().unwrap();
        chain.clear();
        chain.extend(blocks.into_iter().map(|block| (block.height, block)));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Decode `tx.tx_hash` as `tx` instead of from its receipt.
    pub fn set_decoded(&self, tx: BridgeTransaction) {
        self.decoded.lock().unwrap().insert(tx.tx_hash.clone(), tx);
    }

    pub fn fail_decoding(&self, hash: &str) {
        self.undecodable.lock().unwrap().insert(hash.to_string());
    }

    /// Number of `get_block` calls so far.
    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> NodeResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NodeError::Rpc {
                code: -32000,
                message: "node unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn empty_receipt(tx: &Transaction) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: tx.hash.clone(),
            block_hash: tx.block_hash.clone(),
            block_number: tx.block_height,
            succeeded: true,
            logs: vec![],
        }
    }
}

#[async_trait]
impl LedgerNode for MockLedgerNode {
    async fn get_block(&self, tag: BlockTag, with_transactions: bool) -> NodeResult<Block> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let chain = self.chain.lock().unwrap();
        let found = match tag {
            BlockTag::Latest => chain.values().next_back(),
            BlockTag::Height(height) => chain.get(&height),
        };
        let mut block = found
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("block {}", tag)))?;
        if !with_transactions {
            block.transactions.clear();
        }
        Ok(block)
    }

    async fn get_block_number(&self) -> NodeResult<i64> {
        self.check_available()?;
        let chain = self.chain.lock().unwrap();
        Ok(chain.keys().next_back().copied().unwrap_or(0))
    }

    async fn get_transaction(&self, hash: &str) -> NodeResult<Transaction> {
        self.check_available()?;
        let chain = self.chain.lock().unwrap();
        chain
            .values()
            .flat_map(|block| block.transactions.iter())
            .find(|tx| tx.hash == hash)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("transaction {}", hash)))
    }

    async fn get_transaction_receipt(&self, hash: &str) -> NodeResult<TransactionReceipt> {
        let tx = self.get_transaction(hash).await?;
        Ok(Self::empty_receipt(&tx))
    }

    async fn decode_bridge_transaction(&self, tx: &Transaction) -> NodeResult<BridgeTransaction> {
        self.check_available()?;
        if self.undecodable.lock().unwrap().contains(&tx.hash) {
            return Err(NodeError::Parse(format!("cannot decode {}", tx.hash)));
        }
        if let Some(decoded) = self.decoded.lock().unwrap().get(&tx.hash) {
            return Ok(decoded.clone());
        }
        Ok(BridgeTransaction::decode(tx, &Self::empty_receipt(tx))?)
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySyncStore {
    blocks: Mutex<HashMap<String, SyncStatus>>,
    writes: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl MemorySyncStore {
    pub fn with_blocks(blocks: Vec<SyncStatus>) -> Self {
        let store = Self::default();
        store
            .blocks
            .lock()
            .unwrap()
            .extend(blocks.into_iter().map(|status| (status.hash.clone(), status)));
        store
    }

    /// Number of `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Lifecycle for MemorySyncStore {
    async fn start(&self) -> StoreResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> StoreResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SyncStatusStore for MemorySyncStore {
    async fn get_by_id(&self, hash: &str) -> StoreResult<Option<SyncStatus>> {
        Ok(self.blocks.lock().unwrap().get(hash).cloned())
    }

    async fn get_best(&self) -> StoreResult<Option<SyncStatus>> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .values()
            .max_by_key(|status| status.height)
            .cloned())
    }

    async fn set(&self, status: SyncStatus) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.blocks
            .lock()
            .unwrap()
            .insert(status.hash.clone(), status);
        Ok(())
    }

    async fn delete(&self, hash: &str) -> StoreResult<bool> {
        Ok(self.blocks.lock().unwrap().remove(hash).is_some())
    }
}

#[derive(Default)]
pub struct MemoryPeginStore {
    records: Mutex<BTreeMap<String, PeginStatusRecord>>,
    fail_height_delete: AtomicBool,
}

impl MemoryPeginStore {
    /// Make the next `delete_by_rsk_block_height` fail.
    pub fn fail_next_height_delete(&self) {
        self.fail_height_delete.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl Lifecycle for MemoryPeginStore {
    async fn start(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn stop(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl PeginStatusStore for MemoryPeginStore {
    async fn get_by_id(&self, btc_tx_id: &str) -> StoreResult<Option<PeginStatusRecord>> {
        Ok(self.records.lock().unwrap().get(btc_tx_id).cloned())
    }

    async fn set(&self, record: PeginStatusRecord) -> StoreResult<bool> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.btc_tx_id) {
            return Ok(false);
        }
        records.insert(record.btc_tx_id.clone(), record);
        Ok(true)
    }

    async fn delete(&self, btc_tx_id: &str) -> StoreResult<bool> {
        Ok(self.records.lock().unwrap().remove(btc_tx_id).is_some())
    }

    async fn delete_by_rsk_block_height(&self, rsk_block_height: i64) -> StoreResult<u64> {
        if self.fail_height_delete.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("pegin store".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, record| record.rsk_block_height != rsk_block_height);
        Ok((before - records.len()) as u64)
    }
}

/// Keeps versions in insertion order, like the `id` column does.
#[derive(Default)]
pub struct MemoryPegoutStore {
    records: Mutex<Vec<PegoutStatusRecord>>,
    fail_start: AtomicBool,
}

impl MemoryPegoutStore {
    pub fn records(&self) -> Vec<PegoutStatusRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn newest_count(&self, originating_rsk_tx_hash: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| {
                record.originating_rsk_tx_hash == originating_rsk_tx_hash && record.is_newest_status
            })
            .count()
    }

    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    fn insert(records: &mut Vec<PegoutStatusRecord>, record: PegoutStatusRecord) -> bool {
        if records
            .iter()
            .any(|existing| existing.rsk_tx_hash == record.rsk_tx_hash)
        {
            return false;
        }
        records.push(record);
        true
    }
}

#[async_trait]
impl Lifecycle for MemoryPegoutStore {
    async fn start(&self) -> StoreResult<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("pegout store".to_string()));
        }
        Ok(())
    }

    async fn stop(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl PegoutStatusStore for MemoryPegoutStore {
    async fn get_by_id(&self, rsk_tx_hash: &str) -> StoreResult<Option<PegoutStatusRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|record| record.rsk_tx_hash == rsk_tx_hash)
            .cloned())
    }

    async fn get_last_by_originating_rsk_tx_hash(
        &self,
        originating_rsk_tx_hash: &str,
    ) -> StoreResult<Option<PegoutStatusRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|record| {
                record.originating_rsk_tx_hash == originating_rsk_tx_hash && record.is_newest_status
            })
            .cloned())
    }

    async fn get_many(&self, filter: PegoutStatusFilter) -> StoreResult<Vec<PegoutStatusRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn apply_transition(
        &self,
        superseded: Vec<String>,
        inserted: Vec<PegoutStatusRecord>,
    ) -> StoreResult<()> {
        let mut records = self.records.lock().unwrap();
        for record in records.iter_mut() {
            if superseded.contains(&record.rsk_tx_hash) {
                record.is_newest_status = false;
            }
        }
        for record in inserted {
            Self::insert(&mut records, record);
        }
        Ok(())
    }

    async fn set(&self, record: PegoutStatusRecord) -> StoreResult<bool> {
        Ok(Self::insert(&mut self.records.lock().unwrap(), record))
    }

    async fn delete(&self, rsk_tx_hash: &str) -> StoreResult<bool> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|record| record.rsk_tx_hash != rsk_tx_hash);
        Ok(records.len() != before)
    }

    async fn delete_by_rsk_block_height(&self, rsk_block_height: i64) -> StoreResult<u64> {
        let mut records = self.records.lock().unwrap();
        let affected: HashSet<String> = records
            .iter()
            .filter(|record| record.rsk_block_height == rsk_block_height)
            .map(|record| record.originating_rsk_tx_hash.clone())
            .collect();
        let before = records.len();
        records.retain(|record| record.rsk_block_height != rsk_block_height);
        let deleted = (before - records.len()) as u64;

        for originating in affected {
            let has_newest = records.iter().any(|record| {
                record.originating_rsk_tx_hash == originating && record.is_newest_status
            });
            if has_newest {
                continue;
            }
            if let Some(latest) = records
                .iter_mut()
                .rev()
                .find(|record| record.originating_rsk_tx_hash == originating)
            {
                latest.is_newest_status = true;
            }
        }
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Bridge state
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockBridgeState {
    state: Mutex<BridgeState>,
    calls: AtomicUsize,
}

impl MockBridgeState {
    pub fn set_pending(&self, pending: Vec<PendingPegout>) {
        self.state.lock().unwrap().pegouts_waiting_for_confirmations = pending;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BridgeStateSource for MockBridgeState {
    async fn get_bridge_state(&self) -> Result<BridgeState, BridgeStateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// Records notifications as `added:<hash>` / `deleted:<hash>`.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainListener for RecordingListener {
    async fn block_added(&self, block: &Block) -> Result<(), ListenerError> {
        self.events.lock().unwrap().push(format!("added:{}", block.hash));
        Ok(())
    }

    async fn block_deleted(&self, status: &SyncStatus) -> Result<(), ListenerError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("deleted:{}", status.hash));
        Ok(())
    }
}

/// Records the hashes of the transactions it receives.
pub struct RecordingSubscriber {
    name: &'static str,
    filters: Vec<BridgeDataFilter>,
    fail: bool,
    seen: Mutex<Vec<String>>,
}

impl RecordingSubscriber {
    pub fn new(name: &'static str, filters: Vec<BridgeDataFilter>) -> Self {
        Self {
            name,
            filters,
            fail: false,
            seen: Mutex::new(vec![]),
        }
    }

    /// Accepts every transaction and fails after recording it.
    pub fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, vec![])
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeTxSubscriber for RecordingSubscriber {
    fn name(&self) -> &'static str {
        self.name
    }

    fn filters(&self) -> Vec<BridgeDataFilter> {
        self.filters.clone()
    }

    async fn process(&self, tx: &BridgeTransaction) -> Result<(), ProcessorError> {
        self.seen.lock().unwrap().push(tx.tx_hash.clone());
        if self.fail {
            return Err(StoreError::Unavailable(self.name.to_string()).into());
        }
        Ok(())
    }
}
