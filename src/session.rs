//! Synchronization session
//!
//! One session = one diff stream + one snapshot. Diffs are queued from the
//! moment the stream is open; the queue is only drained once the snapshot
//! has been applied. Any fatal error ends the session with the book marked
//! desynced.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, SyncError};
use crate::orderbook::{OrderBookSynchronizer, SyncStatus};
use crate::snapshot::SnapshotLoader;
use crate::store::{StoreSink, StoreWriter};
use crate::websocket::DiffStream;

/// Runs synchronization sessions for one instrument
pub struct SyncSession {
    symbol: String,
    queue_capacity: usize,
    fetch_timeout: Duration,
    loader: Arc<dyn SnapshotLoader>,
    sink: Arc<dyn StoreSink>,
    status: Arc<watch::Sender<SyncStatus>>,
    shutdown: watch::Receiver<bool>,
}

impl SyncSession {
    pub fn new(
        config: &Config,
        loader: Arc<dyn SnapshotLoader>,
        sink: Arc<dyn StoreSink>,
        status: Arc<watch::Sender<SyncStatus>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            symbol: config.symbol.to_lowercase(),
            queue_capacity: config.queue_capacity,
            fetch_timeout: config.connect_timeout(),
            loader,
            sink,
            status,
            shutdown,
        }
    }

    /// Seed a fresh book and keep it synchronized from `stream`
    ///
    /// Returns `Ok(())` when the stream was closed locally, or the fatal
    /// error that ended the session.
    pub async fn run<S>(&self, stream: S) -> Result<()>
    where
        S: DiffStream + 'static,
    {
        let writer = StoreWriter::new(self.sink.clone(), &self.symbol);
        let mut synchronizer = OrderBookSynchronizer::new(&self.symbol, writer);
        self.status.send_replace(synchronizer.status());

        let dispatcher = Dispatcher::new(&self.symbol, self.queue_capacity);
        let reader = dispatcher.spawn_reader(stream, self.shutdown.clone());

        let seeded = synchronizer
            .seed_from(self.loader.as_ref(), self.fetch_timeout)
            .await;
        self.status.send_replace(synchronizer.status());
        if let Err(e) = seeded {
            reader.abort();
            return Err(e);
        }

        if let Err(e) = dispatcher.run(&mut synchronizer, &self.status).await {
            reader.abort();
            return Err(e);
        }

        let ended = match reader.await {
            Ok(Ok(stats)) => {
                info!(
                    symbol = %self.symbol,
                    forwarded = stats.forwarded,
                    parse_errors = stats.parse_errors,
                    last_applied_id = synchronizer.last_applied_id(),
                    "Session stopped"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(SyncError::Transport(format!("reader task failed: {}", e))),
        };

        if let Err(e) = &ended {
            warn!(symbol = %self.symbol, error = %e, "Session ended by stream failure");
            synchronizer.mark_desynced(e);
            self.status.send_replace(synchronizer.status());
        }
        ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnapshotError;
    use crate::orderbook::SyncPhase;
    use crate::store::MemorySink;
    use crate::testing::{diff, snapshot, ScriptedStream, StaticLoader};
    use rust_decimal_macros::dec;

    struct Harness {
        session: SyncSession,
        sink: Arc<MemorySink>,
        status: watch::Receiver<SyncStatus>,
        shutdown: watch::Sender<bool>,
    }

    fn harness(loader: StaticLoader) -> Harness {
        let sink = Arc::new(MemorySink::new());
        let (status_tx, status_rx) = watch::channel(SyncStatus::new("ethbtc"));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = SyncSession::new(
            &Config::default(),
            Arc::new(loader),
            sink.clone(),
            Arc::new(status_tx),
            shutdown_rx,
        );
        Harness {
            session,
            sink,
            status: status_rx,
            shutdown: shutdown_tx,
        }
    }

    #[tokio::test]
    async fn test_buffered_diffs_reconciled_with_snapshot() {
        let h = harness(StaticLoader::ok(snapshot(
            100,
            &[(dec!(10.0), dec!(5))],
            &[(dec!(11.0), dec!(1))],
        )));
        let stream = ScriptedStream::ending(vec![
            // Older than the snapshot
            Ok(diff(90, 95, &[(dec!(10.0), dec!(99))], &[])),
            Ok(diff(96, 100, &[(dec!(10.0), dec!(98))], &[])),
            // Straddles it
            Ok(diff(95, 101, &[(dec!(10.0), dec!(3))], &[])),
            Ok(diff(102, 102, &[], &[(dec!(11.0), dec!(0))])),
        ]);

        h.session.run(stream).await.unwrap();

        let status = h.status.borrow().clone();
        assert_eq!(status.phase, SyncPhase::Synced);
        assert_eq!(status.last_applied_id, 102);
        assert_eq!(status.stale_events, 2);
        assert_eq!(h.sink.get("ethbtc-bids", "10"), Some("3".to_string()));
        assert_eq!(h.sink.get("ethbtc-asks", "11"), None);
    }

    #[tokio::test]
    async fn test_gap_ends_session_desynced() {
        let h = harness(StaticLoader::ok(snapshot(100, &[], &[])));
        let stream = ScriptedStream::open(vec![
            Ok(diff(95, 101, &[], &[])),
            Ok(diff(103, 104, &[(dec!(1), dec!(1))], &[])),
        ]);

        let err = h.session.run(stream).await.unwrap_err();
        assert!(matches!(err, SyncError::SequenceGap { expected: 102, .. }));
        assert_eq!(h.status.borrow().phase, SyncPhase::Desynced);
        assert_eq!(h.sink.get("ethbtc-bids", "1"), None);
    }

    #[tokio::test]
    async fn test_snapshot_failure_surfaces() {
        let h = harness(StaticLoader::err(SnapshotError::InvalidInstrument(
            "ETHBTC".into(),
        )));
        let stream = ScriptedStream::open(vec![]);

        let err = h.session.run(stream).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(h.status.borrow().phase, SyncPhase::Desynced);
    }

    #[tokio::test]
    async fn test_transport_error_desyncs() {
        let h = harness(StaticLoader::ok(snapshot(100, &[], &[])));
        let stream = ScriptedStream::open(vec![
            Ok(diff(100, 101, &[(dec!(2), dec!(2))], &[])),
            Err(SyncError::Transport("Connection closed".into())),
        ]);

        let err = h.session.run(stream).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(h.status.borrow().phase, SyncPhase::Desynced);
        // Applied before the failure, so still mirrored
        assert_eq!(h.sink.get("ethbtc-bids", "2"), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_stops_cleanly() {
        let h = harness(StaticLoader::ok(snapshot(100, &[], &[])));
        let stream = ScriptedStream::open(vec![Ok(diff(101, 101, &[], &[]))]);

        h.shutdown.send(true).unwrap();
        tokio_test::assert_ok!(h.session.run(stream).await);
    }
}
