//! Session manager
//!
//! Runs synchronization sessions back to back. A session that ends with a
//! fatal error is followed by a fresh one (new stream, new snapshot) after
//! an exponential backoff.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::metrics::metrics;
use crate::orderbook::{SyncPhase, SyncStatus};
use crate::session::SyncSession;
use crate::snapshot::SnapshotLoader;
use crate::store::StoreSink;
use crate::websocket::StreamConnector;

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before reconnect attempt `attempt` (1-based)
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.pow(attempt.min(6)));
    Duration::from_millis(delay.min(MAX_BACKOFF_MS))
}

/// Keeps one instrument synchronized across stream failures
pub struct SyncManager<C> {
    config: Arc<Config>,
    connector: C,
    session: SyncSession,
    status_tx: Arc<watch::Sender<SyncStatus>>,
    status: watch::Receiver<SyncStatus>,
    shutdown: watch::Receiver<bool>,
    reconnect_attempts: u32,
}

impl<C: StreamConnector> SyncManager<C> {
    pub fn new(
        config: Arc<Config>,
        connector: C,
        loader: Arc<dyn SnapshotLoader>,
        sink: Arc<dyn StoreSink>,
        status: Arc<watch::Sender<SyncStatus>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let status_rx = status.subscribe();
        let session = SyncSession::new(&config, loader, sink, status.clone(), shutdown.clone());

        Self {
            config,
            connector,
            session,
            status_tx: status,
            status: status_rx,
            shutdown,
            reconnect_attempts: 0,
        }
    }

    /// Run until shutdown, a clean end of the stream, or a non-retryable error
    pub async fn run(&mut self) -> Result<()> {
        info!(symbol = %self.config.symbol, "Starting sync manager");

        loop {
            let stop = *self.shutdown.borrow();
            if stop {
                info!(symbol = %self.config.symbol, "Sync manager stopped by shutdown");
                return Ok(());
            }

            let (err, progressed) = match self.connector.connect(&self.config.symbol).await {
                Ok(stream) => match self.session.run(stream).await {
                    Ok(()) => {
                        info!(symbol = %self.config.symbol, "Diff stream closed, stopping");
                        return Ok(());
                    }
                    Err(e) => {
                        let progressed = self.status.borrow().applied_events > 0;
                        (e, progressed)
                    }
                },
                Err(e) => {
                    self.publish_dial_failure(&e);
                    (e, false)
                }
            };

            error!(symbol = %self.config.symbol, error = %err, "Synchronization session failed");
            if !err.is_retryable() {
                return Err(err);
            }

            // A session that got the book in sync counts as a success
            if progressed {
                self.reconnect_attempts = 0;
            }
            self.reconnect_attempts += 1;

            let max_attempts = self.config.max_reconnect_attempts;
            if max_attempts > 0 && self.reconnect_attempts > max_attempts {
                error!(
                    attempts = self.reconnect_attempts - 1,
                    "Max reconnection attempts exceeded"
                );
                return Err(err);
            }

            let delay = backoff_delay(self.config.reconnect_delay_ms, self.reconnect_attempts);
            warn!(
                attempt = self.reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "Re-seeding after backoff"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.changed() => {}
            }
        }
    }

    /// No session ran, so nothing else marks the book desynced
    fn publish_dial_failure(&self, err: &SyncError) {
        warn!(symbol = %self.config.symbol, error = %err, "Failed to open diff stream");
        self.status_tx.send_modify(|status| {
            status.phase = SyncPhase::Desynced;
        });
        metrics()
            .phase
            .with_label_values(&[self.config.symbol.to_lowercase().as_str()])
            .set(SyncPhase::Desynced.as_gauge());
    }
}
