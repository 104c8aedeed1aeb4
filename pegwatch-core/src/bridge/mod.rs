//! Bridge contract model.
//!
//! Transactions sent to the bridge are decoded into a [`BridgeTransaction`]:
//! the invoked method (when known) plus every bridge event found in the
//! receipt. Decoding never touches storage.

pub mod abi;
pub mod state;

use crate::node::{Transaction, TransactionReceipt};
use thiserror::Error;

/// Address of the bridge precompile on every RSK network.
pub const BRIDGE_ADDRESS: &str = "0x0000000000000000000000000000000001000006";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("ABI decoding failed: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("packed hash list has invalid length {0}")]
    InvalidLength(usize),
}

/// Bridge methods the status processors filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeMethod {
    RegisterBtcTransaction,
    UpdateCollections,
    AddSignature,
    ReceiveHeaders,
}

/// A decoded bridge event.
///
/// Bitcoin transaction hashes are lowercase hex without prefix; ledger
/// hashes and addresses are lowercase hex with `0x` prefix. Amounts are in
/// satoshis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    LockBtc {
        receiver: String,
        btc_tx_hash: String,
        sender_btc_address: String,
        amount: i64,
    },
    PeginBtc {
        receiver: String,
        btc_tx_hash: String,
        amount: i64,
        protocol_version: String,
    },
    RejectedPegin {
        btc_tx_hash: String,
        reason: String,
    },
    UnrefundablePegin {
        btc_tx_hash: String,
        reason: String,
    },
    ReleaseRequested {
        rsk_tx_hash: String,
        btc_tx_hash: String,
        amount: i64,
    },
    ReleaseRequestReceived {
        sender: String,
        btc_destination_address: String,
        amount: i64,
    },
    ReleaseRequestRejected {
        sender: String,
        amount: i64,
        reason: String,
    },
    BatchPegoutCreated {
        btc_tx_hash: String,
        release_rsk_tx_hashes: Vec<String>,
    },
    PegoutConfirmed {
        btc_tx_hash: String,
        pegout_creation_rsk_block_number: i64,
    },
    UpdateCollections {
        sender: String,
    },
    AddSignature {
        release_rsk_tx_hash: String,
        federator_rsk_address: String,
    },
    ReleaseBtc {
        release_rsk_tx_hash: String,
        /// Hex encoded signed bitcoin transaction.
        btc_raw_transaction: String,
    },
}

impl BridgeEvent {
    /// Event name as emitted by the bridge.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::LockBtc { .. } => "lock_btc",
            BridgeEvent::PeginBtc { .. } => "pegin_btc",
            BridgeEvent::RejectedPegin { .. } => "rejected_pegin",
            BridgeEvent::UnrefundablePegin { .. } => "unrefundable_pegin",
            BridgeEvent::ReleaseRequested { .. } => "release_requested",
            BridgeEvent::ReleaseRequestReceived { .. } => "release_request_received",
            BridgeEvent::ReleaseRequestRejected { .. } => "release_request_rejected",
            BridgeEvent::BatchPegoutCreated { .. } => "batch_pegout_created",
            BridgeEvent::PegoutConfirmed { .. } => "pegout_confirmed",
            BridgeEvent::UpdateCollections { .. } => "update_collections",
            BridgeEvent::AddSignature { .. } => "add_signature",
            BridgeEvent::ReleaseBtc { .. } => "release_btc",
        }
    }
}

/// A transaction sent to the bridge, with its call and events decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTransaction {
    pub tx_hash: String,
    pub block_hash: String,
    pub block_number: i64,
    pub created_on: time::OffsetDateTime,
    pub to: String,
    /// Raw call data, kept for filter matching.
    pub data: String,
    pub method: Option<BridgeMethod>,
    /// Bridge events in log order.
    pub events: Vec<BridgeEvent>,
}

impl BridgeTransaction {
    /// Decode a transaction using its receipt.
    ///
    /// Only logs emitted by the contract the transaction was sent to are
    /// considered; unknown events are skipped.
    pub fn decode(tx: &Transaction, receipt: &TransactionReceipt) -> Result<Self, DecodeError> {
        let to = tx.to.clone().unwrap_or_default();
        let mut events = Vec::new();
        for log in receipt
            .logs
            .iter()
            .filter(|log| log.address.eq_ignore_ascii_case(&to))
        {
            if let Some(event) = abi::decode_log(log)? {
                events.push(event);
            }
        }
        Ok(Self {
            tx_hash: tx.hash.clone(),
            block_hash: tx.block_hash.clone(),
            block_number: tx.block_height,
            created_on: tx.created_on,
            method: BridgeMethod::from_call_data(&tx.data),
            data: tx.data.clone(),
            to,
            events,
        })
    }

    /// Whether any event carries the given name.
    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|event| event.name() == name)
    }
}

/// Decides whether a subscriber is interested in a bridge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeDataFilter {
    /// Calls to a specific bridge method.
    Method(BridgeMethod),
    /// Every call.
    Any,
}

impl BridgeDataFilter {
    pub fn matches(&self, call_data: &str) -> bool {
        match self {
            BridgeDataFilter::Method(method) => method.matches(call_data),
            BridgeDataFilter::Any => true,
        }
    }
}
