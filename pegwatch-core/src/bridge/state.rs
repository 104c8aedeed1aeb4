//! Live bridge state snapshot.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum BridgeStateError {
    #[error("bridge state request error: {0}")]
    Request(#[from] reqwest::Error),
}

/// A pegout the bridge has built but not yet seen confirmed on bitcoin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPegout {
    /// Hex encoded unsigned bitcoin transaction.
    pub btc_raw_tx: String,
    pub rsk_tx_hash: String,
    pub pegout_creation_block_number: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeState {
    #[serde(default)]
    pub pegouts_waiting_for_confirmations: Vec<PendingPegout>,
}

impl BridgeState {
    /// Pending pegout created by the given ledger transaction.
    pub fn find_by_rsk_tx_hash(&self, rsk_tx_hash: &str) -> Option<&PendingPegout> {
        self.pegouts_waiting_for_confirmations
            .iter()
            .find(|pegout| pegout.rsk_tx_hash.eq_ignore_ascii_case(rsk_tx_hash))
    }
}

/// Source of the bridge's live state.
#[async_trait]
pub trait BridgeStateSource: Send + Sync {
    async fn get_bridge_state(&self) -> Result<BridgeState, BridgeStateError>;
}

/// Fetches the bridge state as JSON from an HTTP endpoint.
pub struct HttpBridgeStateSource {
    url: Url,
    http_client: reqwest::Client,
}

impl HttpBridgeStateSource {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, BridgeStateError> {
        let http_client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { url, http_client })
    }
}

#[async_trait]
impl BridgeStateSource for HttpBridgeStateSource {
    #[tracing::instrument(skip_all, err, name = "HTTP:GetBridgeState")]
    async fn get_bridge_state(&self) -> Result<BridgeState, BridgeStateError> {
        let state = self
            .http_client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(state)
    }
}
