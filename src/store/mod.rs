//! Store module
//!
//! Mirrors the in-memory book into an external hash store. The book is the
//! source of truth: a failed write is retried once, then logged and dropped.

mod memory;
mod redis_sink;

pub use self::memory::{MemorySink, StoreOp};
pub use self::redis_sink::RedisSink;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::orderbook::Side;

/// Hash-style key/value store the book is mirrored into
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreSink: Send + Sync {
    /// Set `field` of hash `key` to `value`
    async fn upsert(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Remove `field` from hash `key`; absent fields are not an error
    async fn delete(&self, key: &str, field: &str) -> Result<()>;

    /// Remove hash `key` entirely
    async fn clear(&self, key: &str) -> Result<()>;
}

/// Canonical store representation of a decimal (no trailing zeros)
pub fn canonical_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Persistence adapter for one instrument
#[derive(Clone)]
pub struct StoreWriter {
    sink: Arc<dyn StoreSink>,
    symbol: String,
}

impl StoreWriter {
    pub fn new(sink: Arc<dyn StoreSink>, symbol: &str) -> Self {
        Self {
            sink,
            symbol: symbol.to_lowercase(),
        }
    }

    /// Hash key for one side, e.g. `ethbtc-bids`
    pub fn key(&self, side: Side) -> String {
        format!("{}-{}", self.symbol, side.as_str())
    }

    /// Write one level. Idempotent.
    pub async fn persist(&self, side: Side, price: Decimal, quantity: Decimal) -> Result<()> {
        let key = self.key(side);
        let field = canonical_decimal(price);
        let value = canonical_decimal(quantity);

        self.with_retry("persist", &key, &field, || {
            self.sink.upsert(&key, &field, &value)
        })
        .await
    }

    /// Remove one level. Removing an absent level succeeds.
    pub async fn remove(&self, side: Side, price: Decimal) -> Result<()> {
        let key = self.key(side);
        let field = canonical_decimal(price);

        self.with_retry("remove", &key, &field, || self.sink.delete(&key, &field))
            .await
    }

    /// Drop every stored level of one side
    pub async fn clear(&self, side: Side) -> Result<()> {
        let key = self.key(side);
        self.with_retry("clear", &key, "*", || self.sink.clear(&key))
            .await
    }

    /// Run `op` and retry it once on failure
    async fn with_retry<F, Fut>(&self, action: &str, key: &str, field: &str, op: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let first = match op().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        debug!(action, key, field, error = %first, "Store write failed, retrying once");

        match op().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(action, key, field, error = %e, "Store write dropped after retry");
                Err(SyncError::StoreWrite(format!("{} {} {}: {}", action, key, field, e)))
            }
        }
    }
}
