//! Market depth synchronizer
//!
//! Keeps one instrument's Binance order book in sync from the diff depth
//! stream and mirrors it into Redis.
//!
//! Usage: `market-depth-sync [SYMBOL]`

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_depth_sync::{
    health, Config, RedisSink, RestSnapshotLoader, SnapshotLoader, StoreSink, SyncManager,
    SyncStatus, WebSocketConnector,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting market depth synchronizer");

    // Load configuration; the first argument selects the instrument
    let mut config = Config::load()?;
    if let Some(symbol) = std::env::args().nth(1) {
        config = config.with_symbol(&symbol)?;
    }
    let config = Arc::new(config);
    info!(
        symbol = %config.symbol,
        redis_host = %config.redis_host,
        redis_db = config.redis_db,
        queue_capacity = config.queue_capacity,
        "Configuration loaded"
    );

    let sink: Arc<dyn StoreSink> = Arc::new(RedisSink::connect(&config).await?);
    let loader: Arc<dyn SnapshotLoader> = Arc::new(RestSnapshotLoader::new(&config)?);

    let (status_tx, status_rx) = watch::channel(SyncStatus::new(&config.symbol));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start health check server
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_port, status_rx).await {
            warn!(error = %e, "Health server error");
        }
    });

    let mut manager = SyncManager::new(
        config.clone(),
        WebSocketConnector::new(&config),
        loader,
        sink,
        Arc::new(status_tx),
        shutdown_rx,
    );

    let run = manager.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, draining");
            shutdown_tx.send_replace(true);
            run.await?;
        }
    }

    info!("Market depth synchronizer stopped");
    Ok(())
}
