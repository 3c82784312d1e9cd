//! Builders and doubles shared by unit tests

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;

use crate::error::{Result, SnapshotError};
use crate::parser::{DepthUpdate, OrderBookSnapshot, PriceLevel};
use crate::snapshot::SnapshotLoader;
use crate::websocket::DiffStream;

fn levels(pairs: &[(Decimal, Decimal)]) -> Vec<PriceLevel> {
    pairs.iter().map(|(p, q)| PriceLevel::new(*p, *q)).collect()
}

pub fn snapshot(
    last_update_id: u64,
    bids: &[(Decimal, Decimal)],
    asks: &[(Decimal, Decimal)],
) -> OrderBookSnapshot {
    OrderBookSnapshot {
        last_update_id,
        bids: levels(bids),
        asks: levels(asks),
    }
}

pub fn diff(
    first_update_id: u64,
    final_update_id: u64,
    bids: &[(Decimal, Decimal)],
    asks: &[(Decimal, Decimal)],
) -> DepthUpdate {
    DepthUpdate {
        event_type: "depthUpdate".to_string(),
        event_time: 1_672_531_200_000 + final_update_id,
        symbol: "ETHBTC".to_string(),
        first_update_id,
        final_update_id,
        bids: levels(bids),
        asks: levels(asks),
    }
}

/// Loader that always answers with the same result
pub struct StaticLoader(std::result::Result<OrderBookSnapshot, SnapshotError>);

impl StaticLoader {
    pub fn ok(snapshot: OrderBookSnapshot) -> Self {
        Self(Ok(snapshot))
    }

    pub fn err(error: SnapshotError) -> Self {
        Self(Err(error))
    }
}

#[async_trait]
impl SnapshotLoader for StaticLoader {
    async fn fetch_snapshot(
        &self,
        _symbol: &str,
    ) -> std::result::Result<OrderBookSnapshot, SnapshotError> {
        self.0.clone()
    }
}

/// Stream that replays scripted items, then either ends or stays open
pub struct ScriptedStream {
    items: VecDeque<Result<DepthUpdate>>,
    hold_open: bool,
    pub closed: bool,
}

impl ScriptedStream {
    /// Ends (source closed) once the script is exhausted
    pub fn ending(items: Vec<Result<DepthUpdate>>) -> Self {
        Self {
            items: items.into(),
            hold_open: false,
            closed: false,
        }
    }

    /// Never yields again once the script is exhausted
    pub fn open(items: Vec<Result<DepthUpdate>>) -> Self {
        Self {
            items: items.into(),
            hold_open: true,
            closed: false,
        }
    }
}

#[async_trait]
impl DiffStream for ScriptedStream {
    async fn next_update(&mut self) -> Result<Option<DepthUpdate>> {
        if self.closed {
            return Ok(None);
        }
        match self.items.pop_front() {
            Some(item) => item.map(Some),
            None if self.hold_open => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
