//! BridgeTransactionPublisher processor.
//!
//! Receives every added block, picks the transactions sent to the bridge,
//! decodes them and offers them to the registered subscribers one after
//! another. A failing subscriber is logged and does not prevent delivery to
//! the others.

use super::ProcessorError;
use crate::bridge::{BridgeDataFilter, BridgeTransaction};
use crate::events::SubscriberList;
use crate::node::{Block, LedgerNode};
use async_trait::async_trait;
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Consumer of decoded bridge transactions.
#[async_trait]
pub trait BridgeTxSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    /// Calls this subscriber wants to see. An empty list means every call.
    fn filters(&self) -> Vec<BridgeDataFilter>;

    async fn process(&self, tx: &BridgeTransaction) -> Result<(), ProcessorError>;
}

fn accepts(subscriber: &Arc<dyn BridgeTxSubscriber>, call_data: &str) -> bool {
    let filters = subscriber.filters();
    filters.is_empty() || filters.iter().any(|filter| filter.matches(call_data))
}

pub struct BridgeTransactionPublisher {
    node: Arc<dyn LedgerNode>,
    bridge_address: String,
    subscribers: SubscriberList<dyn BridgeTxSubscriber>,
}

impl BridgeTransactionPublisher {
    pub fn new(node: Arc<dyn LedgerNode>, bridge_address: impl Into<String>) -> Self {
        Self {
            node,
            bridge_address: bridge_address.into(),
            subscribers: SubscriberList::new(),
        }
    }

    /// Returns `false` if the subscriber was already registered.
    pub async fn add_subscriber(&self, subscriber: Arc<dyn BridgeTxSubscriber>) -> bool {
        self.subscribers.add(subscriber).await
    }

    pub async fn remove_subscriber(&self, subscriber: &Arc<dyn BridgeTxSubscriber>) -> bool {
        self.subscribers.remove(subscriber).await
    }

    /// Deliver the bridge transactions of `block`.
    ///
    /// Returns the number of bridge transactions found.
    pub async fn publish(&self, block: &Block) -> usize {
        let subscribers = self.subscribers.snapshot().await;
        let mut published = 0;

        for tx in block
            .transactions
            .iter()
            .filter(|tx| tx.is_sent_to(&self.bridge_address))
        {
            published += 1;
            let interested: Vec<_> = subscribers
                .iter()
                .filter(|subscriber| accepts(subscriber, &tx.data))
                .collect();
            if interested.is_empty() {
                continue;
            }

            let bridge_tx = match self.node.decode_bridge_transaction(tx).await {
                Ok(bridge_tx) => bridge_tx,
                Err(e) => {
                    error!(tx = %tx.hash, height = block.height, error = %e, "Failed to decode bridge transaction");
                    continue;
                }
            };
            debug!(
                tx = %bridge_tx.tx_hash,
                method = ?bridge_tx.method,
                events = bridge_tx.events.len(),
                "Publishing bridge transaction"
            );

            for subscriber in interested {
                if let Err(e) = subscriber.process(&bridge_tx).await {
                    warn!(
                        subscriber = subscriber.name(),
                        tx = %bridge_tx.tx_hash,
                        error = %e,
                        "Subscriber failed to process bridge transaction"
                    );
                }
            }
        }

        published
    }
}

impl Processor<Block> for BridgeTransactionPublisher {
    type Output = usize;
    type Error = Infallible;

    async fn process(&self, block: Block) -> Result<usize, Infallible> {
        Ok(self.publish(&block).await)
    }
}
