//! Order book synchronizer
//!
//! Owns both sides of one instrument's book and its sequencing state.
//! Every accepted change goes to memory first, then to the store.

use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use super::{Admission, PriceLevelSet, Side, SyncPhase, SyncState, SyncStatus};
use crate::error::{Result, SyncError};
use crate::metrics::metrics;
use crate::parser::{DepthUpdate, OrderBookSnapshot, PriceLevel};
use crate::snapshot::SnapshotLoader;
use crate::store::StoreWriter;

/// What happened to a diff handed to the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Deltas were applied and the book advanced
    Applied,
    /// Already reflected in the book
    Stale,
    /// Not for this book, or the book is desynced
    Discarded,
}

impl DiffOutcome {
    fn label(&self) -> &'static str {
        match self {
            DiffOutcome::Applied => "applied",
            DiffOutcome::Stale => "stale",
            DiffOutcome::Discarded => "discarded",
        }
    }
}

/// One side of the book with its store mirror
struct SideBook {
    levels: PriceLevelSet,
    writer: StoreWriter,
    store_failures: u64,
}

impl SideBook {
    fn new(side: Side, writer: StoreWriter) -> Self {
        Self {
            levels: PriceLevelSet::new(side),
            writer,
            store_failures: 0,
        }
    }

    async fn reset(&mut self) {
        self.levels.clear();
        if self.writer.clear(self.levels.side()).await.is_err() {
            self.store_failures += 1;
        }
    }

    /// Apply deltas in order, returning the number of dropped store writes
    async fn apply(&mut self, deltas: &[PriceLevel]) -> u64 {
        let side = self.levels.side();
        let mut failures = 0;

        for level in deltas {
            let change = self.levels.upsert(level.price, level.quantity);
            trace!(side = %side, price = %level.price, qty = %level.quantity, change = ?change, "Level updated");

            let written = if level.quantity <= Decimal::ZERO {
                self.writer.remove(side, level.price).await
            } else {
                self.writer.persist(side, level.price, level.quantity).await
            };
            if written.is_err() {
                failures += 1;
            }
        }

        self.store_failures += failures;
        failures
    }
}

/// Synchronizes one instrument's book from a snapshot plus diffs
pub struct OrderBookSynchronizer {
    symbol: String,
    state: SyncState,
    bids: SideBook,
    asks: SideBook,
    applied_events: u64,
    stale_events: u64,
    discarded_events: u64,
    last_event_time: u64,
}

impl OrderBookSynchronizer {
    pub fn new(symbol: &str, writer: StoreWriter) -> Self {
        let synchronizer = Self {
            symbol: symbol.to_lowercase(),
            state: SyncState::new(),
            bids: SideBook::new(Side::Bid, writer.clone()),
            asks: SideBook::new(Side::Ask, writer),
            applied_events: 0,
            stale_events: 0,
            discarded_events: 0,
            last_event_time: 0,
        };
        synchronizer.record_phase();
        synchronizer
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.phase()
    }

    pub fn last_applied_id(&self) -> u64 {
        self.state.last_applied_id()
    }

    pub fn bids(&self) -> &PriceLevelSet {
        &self.bids.levels
    }

    pub fn asks(&self) -> &PriceLevelSet {
        &self.asks.levels
    }

    /// Best `depth` levels per side as (bids, asks)
    pub fn top(&self, depth: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        (self.bids.levels.top(depth), self.asks.levels.top(depth))
    }

    /// Fetch a snapshot and seed from it
    ///
    /// A failed or timed out fetch desyncs the book.
    pub async fn seed_from(
        &mut self,
        loader: &dyn SnapshotLoader,
        fetch_timeout: Duration,
    ) -> Result<()> {
        self.state.begin_seeding();
        self.record_phase();

        let fetched = match timeout(fetch_timeout, loader.fetch_snapshot(&self.symbol)).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::ConnectionTimeout),
        };

        match fetched {
            Ok(snapshot) => {
                self.seed(&snapshot).await;
                Ok(())
            }
            Err(err) => {
                self.mark_desynced(&err);
                Err(err)
            }
        }
    }

    /// Replace the whole book (memory and store) with `snapshot`
    pub async fn seed(&mut self, snapshot: &OrderBookSnapshot) {
        self.state.begin_seeding();

        let bids = &mut self.bids;
        let asks = &mut self.asks;
        tokio::join!(bids.reset(), asks.reset());
        let (bid_failures, ask_failures) =
            tokio::join!(bids.apply(&snapshot.bids), asks.apply(&snapshot.asks));
        self.record_store_failures(bid_failures + ask_failures);

        self.state.seeded(snapshot.last_update_id);
        self.record_phase();
        metrics()
            .last_update_id
            .with_label_values(&[self.symbol.as_str()])
            .set(snapshot.last_update_id as i64);

        info!(
            symbol = %self.symbol,
            last_update_id = snapshot.last_update_id,
            bid_levels = self.bids.levels.len(),
            ask_levels = self.asks.levels.len(),
            "Order book seeded from snapshot"
        );
    }

    /// Apply one diff event if it continues the book
    ///
    /// A sequence gap desyncs the book and is returned as an error; every
    /// later diff is discarded until the book is seeded again.
    pub async fn apply_diff(&mut self, update: &DepthUpdate) -> Result<DiffOutcome> {
        if !update.symbol.eq_ignore_ascii_case(&self.symbol) {
            warn!(
                symbol = %self.symbol,
                event_symbol = %update.symbol,
                "Diff for another instrument, discarding"
            );
            return Ok(self.count(DiffOutcome::Discarded));
        }
        update.validate()?;

        match self
            .state
            .admit(update.first_update_id, update.final_update_id)
        {
            Admission::Closed if self.state.phase() == SyncPhase::Seeding => {
                Err(SyncError::NotSeeded)
            }
            Admission::Closed => {
                trace!(
                    symbol = %self.symbol,
                    final_update_id = update.final_update_id,
                    "Book desynced, discarding diff"
                );
                Ok(self.count(DiffOutcome::Discarded))
            }
            Admission::Stale => {
                debug!(
                    symbol = %self.symbol,
                    first_update_id = update.first_update_id,
                    final_update_id = update.final_update_id,
                    last_applied_id = self.state.last_applied_id(),
                    "Stale diff, skipping"
                );
                Ok(self.count(DiffOutcome::Stale))
            }
            Admission::Gap { expected } => {
                let err = SyncError::SequenceGap {
                    expected,
                    first: update.first_update_id,
                    last: update.final_update_id,
                };
                metrics()
                    .sequence_gaps
                    .with_label_values(&[self.symbol.as_str()])
                    .inc();
                self.mark_desynced(&err);
                Err(err)
            }
            Admission::Apply => {
                let was_buffering = self.state.phase() == SyncPhase::Buffering;

                let bids = &mut self.bids;
                let asks = &mut self.asks;
                let (bid_failures, ask_failures) =
                    tokio::join!(bids.apply(&update.bids), asks.apply(&update.asks));
                self.record_store_failures(bid_failures + ask_failures);

                self.state.commit(update.final_update_id);
                self.last_event_time = update.event_time;
                metrics()
                    .last_update_id
                    .with_label_values(&[self.symbol.as_str()])
                    .set(update.final_update_id as i64);

                if was_buffering {
                    self.record_phase();
                    info!(
                        symbol = %self.symbol,
                        first_update_id = update.first_update_id,
                        final_update_id = update.final_update_id,
                        "Order book synchronized with diff stream"
                    );
                } else {
                    trace!(
                        symbol = %self.symbol,
                        final_update_id = update.final_update_id,
                        "Diff applied"
                    );
                }
                Ok(self.count(DiffOutcome::Applied))
            }
        }
    }

    /// Stop accepting diffs until the next seed
    pub fn mark_desynced(&mut self, reason: &SyncError) {
        if self.state.phase() != SyncPhase::Desynced {
            error!(
                symbol = %self.symbol,
                last_applied_id = self.state.last_applied_id(),
                reason = %reason,
                "Order book desynchronized, re-seed required"
            );
        }
        self.state.desync();
        self.record_phase();
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            symbol: self.symbol.clone(),
            phase: self.state.phase(),
            last_applied_id: self.state.last_applied_id(),
            last_event_time: self.last_event_time,
            bid_levels: self.bids.levels.len(),
            ask_levels: self.asks.levels.len(),
            best_bid: self.bids.levels.best(),
            best_ask: self.asks.levels.best(),
            applied_events: self.applied_events,
            stale_events: self.stale_events,
            discarded_events: self.discarded_events,
            store_failures: self.bids.store_failures + self.asks.store_failures,
        }
    }

    fn count(&mut self, outcome: DiffOutcome) -> DiffOutcome {
        match outcome {
            DiffOutcome::Applied => self.applied_events += 1,
            DiffOutcome::Stale => self.stale_events += 1,
            DiffOutcome::Discarded => self.discarded_events += 1,
        }
        metrics()
            .events
            .with_label_values(&[self.symbol.as_str(), outcome.label()])
            .inc();
        outcome
    }

    fn record_phase(&self) {
        metrics()
            .phase
            .with_label_values(&[self.symbol.as_str()])
            .set(self.state.phase().as_gauge());
    }

    fn record_store_failures(&self, failures: u64) {
        if failures > 0 {
            metrics()
                .store_failures
                .with_label_values(&[self.symbol.as_str()])
                .inc_by(failures);
        }
    }
}


#[cfg(test)]
mod sequence_properties {
    use super::*;
    use crate::store::MemorySink;
    use crate::testing::{diff, snapshot};
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;
    use std::sync::Arc;

    /// (offset of the first id from the next expected id, span, bid price, bid quantity)
    fn arb_diffs() -> impl Strategy<Value = Vec<(i64, u64, u32, u32)>> {
        proptest::collection::vec((-4i64..=2, 0u64..3, 1u32..6, 0u32..4), 1..30)
    }

    proptest! {
        #[test]
        fn only_contiguous_diffs_touch_book_and_store(
            snapshot_id in 1u64..500,
            diffs in arb_diffs(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let sink = Arc::new(MemorySink::new());
                let writer = StoreWriter::new(sink.clone(), "ethbtc");
                let mut sync = OrderBookSynchronizer::new("ethbtc", writer);
                sync.seed(&snapshot(snapshot_id, &[(Decimal::from(3), Decimal::ONE)], &[]))
                    .await;
                let mut desynced = false;

                for (offset, span, price, quantity) in diffs {
                    let first = (sync.last_applied_id() as i64 + 1 + offset).max(1) as u64;
                    let last = first + span;
                    let before_id = sync.last_applied_id();
                    let before_book = sync.bids().snapshot();
                    let before_ops = sink.operations().len();

                    let update = diff(
                        first,
                        last,
                        &[(Decimal::from(price), Decimal::from(quantity))],
                        &[],
                    );
                    let applied = match sync.apply_diff(&update).await {
                        Ok(DiffOutcome::Applied) => true,
                        Ok(_) => false,
                        Err(e) => {
                            let is_sequence_gap = matches!(e, SyncError::SequenceGap { .. });
                            prop_assert!(is_sequence_gap);
                            prop_assert!(!desynced);
                            desynced = true;
                            false
                        }
                    };

                    if applied {
                        prop_assert!(!desynced);
                        prop_assert!(last > before_id);
                        prop_assert_eq!(sync.last_applied_id(), last);
                        // Zero quantities still issue one delete
                        prop_assert_eq!(sink.operations().len(), before_ops + 1);
                    } else {
                        prop_assert_eq!(sync.last_applied_id(), before_id);
                        prop_assert_eq!(sync.bids().snapshot(), before_book);
                        prop_assert_eq!(sink.operations().len(), before_ops);
                    }

                    if desynced {
                        prop_assert_eq!(sync.phase(), SyncPhase::Desynced);
                    }
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
