//! Order book module
//!
//! Keeps a local order book in step with Binance depth diffs. The book is
//! seeded from a REST snapshot, then advanced only by diffs that continue
//! the update-id sequence without a hole.

mod levels;
mod sequencer;
mod synchronizer;

pub use levels::{LevelChange, PriceLevelSet};
pub use sequencer::{Admission, SyncState};
pub use synchronizer::{DiffOutcome, OrderBookSynchronizer};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::parser::PriceLevel;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Name used in store keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bids",
            Side::Ask => "asks",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronization phase of one instrument's book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    /// Waiting for (or applying) the REST snapshot
    Seeding,
    /// Snapshot applied, looking for the first diff that continues it
    Buffering,
    /// Applying contiguous diffs
    Synced,
    /// A hole in the sequence was seen; the book must be re-seeded
    Desynced,
}

impl SyncPhase {
    pub fn as_gauge(&self) -> i64 {
        match self {
            SyncPhase::Seeding => 0,
            SyncPhase::Buffering => 1,
            SyncPhase::Synced => 2,
            SyncPhase::Desynced => 3,
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Seeding => "SEEDING",
            SyncPhase::Buffering => "BUFFERING",
            SyncPhase::Synced => "SYNCED",
            SyncPhase::Desynced => "DESYNCED",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a synchronizer, published for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub symbol: String,
    pub phase: SyncPhase,
    pub last_applied_id: u64,
    pub last_event_time: u64,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub best_bid: Option<PriceLevel>,
    pub best_ask: Option<PriceLevel>,
    pub applied_events: u64,
    pub stale_events: u64,
    pub discarded_events: u64,
    pub store_failures: u64,
}

impl SyncStatus {
    /// Status of a synchronizer that has not started seeding yet
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            phase: SyncPhase::Seeding,
            last_applied_id: 0,
            last_event_time: 0,
            bid_levels: 0,
            ask_levels: 0,
            best_bid: None,
            best_ask: None,
            applied_events: 0,
            stale_events: 0,
            discarded_events: 0,
            store_failures: 0,
        }
    }

    /// Only a synced book reflects the exchange
    pub fn is_healthy(&self) -> bool {
        self.phase == SyncPhase::Synced
    }
}
