//! Diff dispatch
//!
//! A single reader pulls diffs from the stream into a bounded queue; the
//! consumer drains the queue into the synchronizer in arrival order. A full
//! queue blocks the reader instead of dropping diffs.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::metrics::metrics;
use crate::orderbook::{DiffOutcome, OrderBookSynchronizer, SyncStatus};
use crate::parser::DepthUpdate;
use crate::websocket::DiffStream;

/// Default queue capacity between reader and book
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Counters kept by the reader task
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    pub forwarded: u64,
    pub parse_errors: u64,
}

/// Bounded diff queue with its reader and consumer ends
pub struct Dispatcher {
    symbol: String,
    sender: mpsc::Sender<DepthUpdate>,
    receiver: mpsc::Receiver<DepthUpdate>,
}

impl Dispatcher {
    pub fn new(symbol: &str, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            symbol: symbol.to_lowercase(),
            sender,
            receiver,
        }
    }

    /// Start the reader task feeding the queue from `stream`
    ///
    /// The reader stops when the stream ends, fails, the consumer goes away,
    /// or `shutdown` flips to true (closing the stream).
    pub fn spawn_reader<S>(
        &self,
        stream: S,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<Result<ReaderStats>>
    where
        S: DiffStream + 'static,
    {
        let sender = self.sender.clone();
        let symbol = self.symbol.clone();
        tokio::spawn(pump(stream, sender, shutdown, symbol))
    }

    /// Drain queued diffs into `synchronizer` until every reader is done
    ///
    /// Publishes the synchronizer status after each applied diff and on
    /// exit. Returns the first fatal error.
    pub async fn run(
        self,
        synchronizer: &mut OrderBookSynchronizer,
        status: &watch::Sender<SyncStatus>,
    ) -> Result<()> {
        let Dispatcher {
            sender, mut receiver, ..
        } = self;
        // Only reader tasks hold senders from here on
        drop(sender);

        while let Some(update) = receiver.recv().await {
            match synchronizer.apply_diff(&update).await {
                Ok(DiffOutcome::Applied) => {
                    status.send_replace(synchronizer.status());
                }
                Ok(_) => {}
                Err(e) if !e.is_fatal() => {
                    warn!(symbol = %synchronizer.symbol(), error = %e, "Discarding diff");
                }
                Err(e) => {
                    status.send_replace(synchronizer.status());
                    return Err(e);
                }
            }
        }

        status.send_replace(synchronizer.status());
        Ok(())
    }
}

async fn pump<S: DiffStream>(
    mut stream: S,
    sender: mpsc::Sender<DepthUpdate>,
    mut shutdown: watch::Receiver<bool>,
    symbol: String,
) -> Result<ReaderStats> {
    let mut stats = ReaderStats::default();

    loop {
        let stop = *shutdown.borrow();
        if stop {
            info!(symbol = %symbol, "Shutdown requested, closing diff stream");
            stream.close().await;
            return Ok(stats);
        }

        let next = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Nobody can request shutdown any more
                    info!(symbol = %symbol, "Shutdown handle dropped, closing diff stream");
                    stream.close().await;
                    return Ok(stats);
                }
                continue;
            }
            next = stream.next_update() => next,
        };

        match next {
            Ok(Some(update)) => {
                if sender.send(update).await.is_err() {
                    debug!(symbol = %symbol, "Consumer gone, stopping reader");
                    stream.close().await;
                    return Ok(stats);
                }
                stats.forwarded += 1;
            }
            Ok(None) => {
                info!(symbol = %symbol, forwarded = stats.forwarded, "Diff stream closed");
                return Ok(stats);
            }
            Err(SyncError::Parse(msg)) => {
                stats.parse_errors += 1;
                metrics()
                    .parse_errors
                    .with_label_values(&[symbol.as_str()])
                    .inc();
                warn!(symbol = %symbol, error = %msg, "Skipping malformed diff");
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Diff stream failed");
                return Err(e);
            }
        }
    }
}
