//! Read-only access to the ledger node.
//!
//! [`LedgerNode`] is the seam the synchronizer and the publisher depend on.
//! The production implementation is [`rpc::RskNodeClient`], a JSON-RPC
//! client; tests substitute an in-memory node.

pub mod rpc;

use crate::bridge::{BridgeTransaction, DecodeError};
use async_trait::async_trait;
use thiserror::Error;

pub use rpc::RskNodeClient;

/// Errors returned by a ledger node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// HTTP transport error
    #[error("node request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object
    #[error("node returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The requested block or transaction does not exist on the node
    #[error("not found on node: {0}")]
    NotFound(String),

    /// The node answered with data that could not be interpreted
    #[error("malformed node response: {0}")]
    Parse(String),

    /// Bridge call data or logs could not be decoded
    #[error("bridge decoding error: {0}")]
    Decode(#[from] DecodeError),
}

pub type NodeResult<T> = Result<T, NodeError>;

/// Which block to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Height(i64),
}

impl std::fmt::Display for BlockTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockTag::Latest => write!(f, "latest"),
            BlockTag::Height(height) => write!(f, "{}", height),
        }
    }
}

/// A block as observed on some chain. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub height: i64,
    pub hash: String,
    pub parent_hash: String,
    /// Empty when the block was fetched without transactions.
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub block_hash: String,
    pub block_height: i64,
    /// `None` for contract creations.
    pub to: Option<String>,
    /// Hex encoded call payload, `0x` prefixed.
    pub data: String,
    /// Timestamp of the containing block.
    pub created_on: time::OffsetDateTime,
}

impl Transaction {
    /// Whether this transaction is addressed to `address` (case-insensitive).
    pub fn is_sent_to(&self, address: &str) -> bool {
        self.to
            .as_deref()
            .is_some_and(|to| to.eq_ignore_ascii_case(address))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_hash: String,
    pub block_number: i64,
    pub succeeded: bool,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

/// Read-only ledger node.
#[async_trait]
pub trait LedgerNode: Send + Sync {
    /// Fetch a block by height or the current head.
    async fn get_block(&self, tag: BlockTag, with_transactions: bool) -> NodeResult<Block>;

    /// Height of the node's current head.
    async fn get_block_number(&self) -> NodeResult<i64>;

    async fn get_transaction(&self, hash: &str) -> NodeResult<Transaction>;

    async fn get_transaction_receipt(&self, hash: &str) -> NodeResult<TransactionReceipt>;

    /// Resolve the decoded bridge method and events of a transaction sent to
    /// the bridge contract.
    async fn decode_bridge_transaction(&self, tx: &Transaction) -> NodeResult<BridgeTransaction> {
        let receipt = self.get_transaction_receipt(&tx.hash).await?;
        Ok(BridgeTransaction::decode(tx, &receipt)?)
    }
}
