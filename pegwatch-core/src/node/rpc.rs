//! JSON-RPC client for an RSK node.

use super::{Block, BlockTag, LedgerNode, Log, NodeError, NodeResult, Transaction, TransactionReceipt};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Ledger node client speaking the `eth_*` JSON-RPC dialect over HTTP.
pub struct RskNodeClient {
    url: Url,
    http_client: reqwest::Client,
    next_id: AtomicU64,
}

impl RskNodeClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `url` - JSON-RPC endpoint of the node
    /// * `request_timeout` - Upper bound for a single request
    pub fn new(url: Url, request_timeout: Duration) -> NodeResult<Self> {
        let http_client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            url,
            http_client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> NodeResult<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(method, id, "Sending node request");

        let response: JsonRpcResponse<T> = self
            .http_client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(NodeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }

    async fn fetch_block(&self, tag: BlockTag, with_transactions: bool) -> NodeResult<RpcBlock> {
        let tag_param = match tag {
            BlockTag::Latest => "latest".to_string(),
            BlockTag::Height(height) => format!("0x{:x}", height),
        };
        self.call::<RpcBlock>(
            "eth_getBlockByNumber",
            serde_json::json!([tag_param, with_transactions]),
        )
        .await?
        .ok_or_else(|| NodeError::NotFound(format!("block {}", tag)))
    }
}

#[async_trait]
impl LedgerNode for RskNodeClient {
    async fn get_block(&self, tag: BlockTag, with_transactions: bool) -> NodeResult<Block> {
        self.fetch_block(tag, with_transactions).await?.into_block()
    }

    async fn get_block_number(&self) -> NodeResult<i64> {
        let number: String = self
            .call("eth_blockNumber", serde_json::json!([]))
            .await?
            .ok_or_else(|| NodeError::Parse("empty eth_blockNumber result".to_string()))?;
        parse_quantity(&number)
    }

    async fn get_transaction(&self, hash: &str) -> NodeResult<Transaction> {
        let tx: RpcTransaction = self
            .call("eth_getTransactionByHash", serde_json::json!([hash]))
            .await?
            .ok_or_else(|| NodeError::NotFound(format!("transaction {}", hash)))?;
        let Some(block_number) = tx.block_number.as_deref() else {
            return Err(NodeError::NotFound(format!("transaction {} is not mined", hash)));
        };
        let block = self
            .fetch_block(BlockTag::Height(parse_quantity(block_number)?), false)
            .await?;
        tx.into_transaction(parse_timestamp(&block.timestamp)?)
    }

    async fn get_transaction_receipt(&self, hash: &str) -> NodeResult<TransactionReceipt> {
        let receipt: RpcReceipt = self
            .call("eth_getTransactionReceipt", serde_json::json!([hash]))
            .await?
            .ok_or_else(|| NodeError::NotFound(format!("receipt {}", hash)))?;
        receipt.into_receipt()
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: String,
    hash: String,
    parent_hash: String,
    timestamp: String,
    #[serde(default)]
    transactions: Vec<RpcBlockTransaction>,
}

/// Blocks fetched without transactions only carry hashes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcBlockTransaction {
    Full(RpcTransaction),
    Hash(String),
}

impl RpcBlock {
    fn into_block(self) -> NodeResult<Block> {
        let created_on = parse_timestamp(&self.timestamp)?;
        let transactions = self
            .transactions
            .into_iter()
            .filter_map(|tx| match tx {
                RpcBlockTransaction::Full(tx) => Some(tx.into_transaction(created_on)),
                RpcBlockTransaction::Hash(_) => None,
            })
            .collect::<NodeResult<Vec<_>>>()?;
        Ok(Block {
            height: parse_quantity(&self.number)?,
            hash: self.hash,
            parent_hash: self.parent_hash,
            transactions,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    hash: String,
    block_hash: Option<String>,
    block_number: Option<String>,
    to: Option<String>,
    input: String,
}

impl RpcTransaction {
    fn into_transaction(self, created_on: time::OffsetDateTime) -> NodeResult<Transaction> {
        let (Some(block_hash), Some(block_number)) = (self.block_hash, self.block_number) else {
            return Err(NodeError::Parse(format!(
                "transaction {} has no block information",
                self.hash
            )));
        };
        Ok(Transaction {
            hash: self.hash,
            block_hash,
            block_height: parse_quantity(&block_number)?,
            to: self.to,
            data: self.input,
            created_on,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_hash: String,
    block_number: String,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
}

impl RpcReceipt {
    fn into_receipt(self) -> NodeResult<TransactionReceipt> {
        let succeeded = match self.status.as_deref() {
            Some(status) => parse_quantity(status)? == 1,
            None => true,
        };
        Ok(TransactionReceipt {
            transaction_hash: self.transaction_hash,
            block_hash: self.block_hash,
            block_number: parse_quantity(&self.block_number)?,
            succeeded,
            logs: self
                .logs
                .into_iter()
                .map(|log| Log {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                })
                .collect(),
        })
    }
}

/// Parse a `0x` prefixed hex quantity.
fn parse_quantity(value: &str) -> NodeResult<i64> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Ok(0);
    }
    i64::from_str_radix(digits, 16)
        .map_err(|e| NodeError::Parse(format!("invalid quantity {}: {}", value, e)))
}

fn parse_timestamp(value: &str) -> NodeResult<time::OffsetDateTime> {
    let seconds = parse_quantity(value)?;
    time::OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| NodeError::Parse(format!("invalid timestamp {}: {}", value, e)))
}
