//! Pegwatch Server
//!
//! Follows the RSK chain, tracks the bridge's pegin and pegout statuses in
//! PostgreSQL and exposes a small operations endpoint.

mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use pegwatch_core::bridge::state::HttpBridgeStateSource;
use pegwatch_core::framework::DatabaseProcessor;
use pegwatch_core::node::RskNodeClient;
use pegwatch_core::processors::{
    BridgeTransactionPublisher, ChainSynchronizer, PeginStatusProcessor, PegoutStatusProcessor,
    SyncDaemon,
};
use pegwatch_core::store::PostgresStore;
use server::{build_router, run_server};
use shutdown::shutdown_signal;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Pegwatch - RSK bridge status synchronizer
#[derive(Parser, Debug)]
#[command(name = "pegwatch-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./pegwatch-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "PEGWATCH_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_json);

    tracing::info!("Starting pegwatch-server v{}", env!("CARGO_PKG_VERSION"));

    let loaded_config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!("Configuration loaded from {:?}", args.config);
    let listen_addr = loaded_config.listen;
    let config = loaded_config.pegwatch;

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Wiring
    let store = Arc::new(PostgresStore::new(DatabaseProcessor::new(db_pool.clone())));
    let node = Arc::new(RskNodeClient::new(
        config.node.url.clone(),
        config.node.request_timeout,
    )?);
    let bridge_state = Arc::new(HttpBridgeStateSource::new(
        config.bridge.state_url.clone(),
        config.node.request_timeout,
    )?);

    let synchronizer = Arc::new(ChainSynchronizer::new(
        node.clone(),
        store.clone(),
        config.sync.min_depth,
        config.sync.default_block.clone(),
    ));
    let publisher = Arc::new(BridgeTransactionPublisher::new(
        node.clone(),
        config.bridge.address.clone(),
    ));
    publisher
        .add_subscriber(Arc::new(PeginStatusProcessor::new(store.clone())))
        .await;
    publisher
        .add_subscriber(Arc::new(PegoutStatusProcessor::new(
            store.clone(),
            bridge_state,
            config.pegout.clone(),
        )))
        .await;

    let daemon = SyncDaemon::new(
        synchronizer.clone(),
        publisher,
        store.clone(),
        store.clone(),
        store,
        config.sync.interval,
    );
    daemon.start().await.map_err(|e| {
        tracing::error!("Failed to start sync daemon: {}", e);
        e
    })?;

    // Health server runs until the daemon has been stopped
    let router = build_router(AppState::new(synchronizer));
    let (server_shutdown_tx, server_shutdown_rx) = oneshot::channel::<()>();
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let mut server_handle = tokio::spawn(run_server(router, listen_addr, async move {
        let _ = server_shutdown_rx.await;
    }));

    // A server that exits on its own (e.g. bind failure) also shuts down
    let finished_early = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut server_handle => Some(result),
    };

    tracing::info!("Stopping sync daemon...");
    if let Err(e) = daemon.stop().await {
        tracing::error!("Failed to stop sync daemon cleanly: {}", e);
    }

    let server_result = match finished_early {
        Some(result) => result,
        None => {
            let _ = server_shutdown_tx.send(());
            server_handle.await
        }
    };

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    server_result?.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
