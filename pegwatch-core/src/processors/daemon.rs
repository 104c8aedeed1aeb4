//! SyncDaemon.
//!
//! Owns the poll loop: one `sync` per tick, the next tick scheduled only
//! after the previous one finished. While running it listens to the
//! synchronizer, forwarding added blocks to the publisher and cleaning the
//! status stores when a block is orphaned.

use super::chain_sync::ChainSynchronizer;
use super::publisher::BridgeTransactionPublisher;
use crate::entities::sync_status::SyncStatus;
use crate::events::{ChainListener, ListenerError};
use crate::node::Block;
use crate::store::{PeginStatusStore, PegoutStatusStore, StoreError, SyncStatusStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("sync task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Reacts to chain notifications on behalf of the daemon.
struct StatusListener {
    publisher: Arc<BridgeTransactionPublisher>,
    pegin_store: Arc<dyn PeginStatusStore>,
    pegout_store: Arc<dyn PegoutStatusStore>,
}

#[async_trait]
impl ChainListener for StatusListener {
    async fn block_added(&self, block: &Block) -> Result<(), ListenerError> {
        let published = self.publisher.publish(block).await;
        if published > 0 {
            debug!(height = block.height, published, "Bridge transactions published");
        }
        Ok(())
    }

    async fn block_deleted(&self, status: &SyncStatus) -> Result<(), ListenerError> {
        let pegins = self
            .pegin_store
            .delete_by_rsk_block_height(status.height)
            .await?;
        let pegouts = self
            .pegout_store
            .delete_by_rsk_block_height(status.height)
            .await?;
        info!(
            height = status.height,
            hash = %status.hash,
            pegins,
            pegouts,
            "Removed statuses of orphaned block"
        );
        Ok(())
    }
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    listener: Arc<dyn ChainListener>,
}

pub struct SyncDaemon {
    synchronizer: Arc<ChainSynchronizer>,
    publisher: Arc<BridgeTransactionPublisher>,
    sync_store: Arc<dyn SyncStatusStore>,
    pegin_store: Arc<dyn PeginStatusStore>,
    pegout_store: Arc<dyn PegoutStatusStore>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl SyncDaemon {
    pub fn new(
        synchronizer: Arc<ChainSynchronizer>,
        publisher: Arc<BridgeTransactionPublisher>,
        sync_store: Arc<dyn SyncStatusStore>,
        pegin_store: Arc<dyn PeginStatusStore>,
        pegout_store: Arc<dyn PegoutStatusStore>,
        interval: Duration,
    ) -> Self {
        Self {
            synchronizer,
            publisher,
            sync_store,
            pegin_store,
            pegout_store,
            interval,
            running: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Start the stores, subscribe to the synchronizer and spawn the poll
    /// loop. Starting a running daemon does nothing.
    pub async fn start(&self) -> Result<(), DaemonError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Sync daemon already running");
            return Ok(());
        }

        self.sync_store.start().await?;
        self.pegin_store.start().await?;
        self.pegout_store.start().await?;

        let listener: Arc<dyn ChainListener> = Arc::new(StatusListener {
            publisher: self.publisher.clone(),
            pegin_store: self.pegin_store.clone(),
            pegout_store: self.pegout_store.clone(),
        });
        self.synchronizer.subscribe(listener.clone()).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(self.synchronizer.clone(), self.interval, shutdown_rx));

        *running = Some(Running {
            shutdown_tx,
            handle,
            listener,
        });
        info!(interval = ?self.interval, "Sync daemon started");
        Ok(())
    }

    /// Stop scheduling ticks, wait for an in-flight tick, unsubscribe and
    /// stop the stores. Stopping a stopped daemon does nothing.
    pub async fn stop(&self) -> Result<(), DaemonError> {
        let Some(running) = self.running.lock().await.take() else {
            debug!("Sync daemon not running");
            return Ok(());
        };

        let _ = running.shutdown_tx.send(true);
        running.handle.await?;
        self.synchronizer.unsubscribe(&running.listener).await;

        self.sync_store.stop().await?;
        self.pegin_store.stop().await?;
        self.pegout_store.stop().await?;
        info!("Sync daemon stopped");
        Ok(())
    }
}

async fn run(
    synchronizer: Arc<ChainSynchronizer>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        match synchronizer.sync().await {
            Ok(report) if report.added > 0 || report.deleted > 0 => {
                info!(added = report.added, deleted = report.deleted, "Sync cycle completed");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Sync cycle failed"),
        }

        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                info!("Sync loop received shutdown signal");
                break;
            }

            _ = tokio::time::sleep(interval) => {}
        }
    }
}
