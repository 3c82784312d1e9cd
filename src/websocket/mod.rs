//! WebSocket module for the Binance diff depth stream

mod client;

pub use client::{WebSocketClient, WebSocketConnector};

use async_trait::async_trait;

use crate::error::Result;
use crate::parser::DepthUpdate;

/// Lazy, unbounded source of diff events
///
/// A dropped connection is a terminal `Transport` error: the stream cannot
/// be resumed and the book has to be re-seeded from a new one. A `Parse`
/// error only costs the offending frame. `Ok(None)` means the source was
/// closed locally.
#[async_trait]
pub trait DiffStream: Send {
    async fn next_update(&mut self) -> Result<Option<DepthUpdate>>;

    /// Close the source; later calls to `next_update` return `Ok(None)`
    async fn close(&mut self);
}

/// Opens a fresh diff stream for each synchronization session
#[async_trait]
pub trait StreamConnector: Send + Sync {
    type Stream: DiffStream + 'static;

    async fn connect(&self, symbol: &str) -> Result<Self::Stream>;
}
