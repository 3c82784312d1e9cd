//! Market depth synchronizer library
//!
//! Reconciles a Binance depth snapshot with the diff depth stream into a
//! local order book, and mirrors the book into a Redis hash per side.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod manager;
pub mod metrics;
pub mod orderbook;
pub mod parser;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{Result, SnapshotError, SyncError};
pub use manager::SyncManager;
pub use orderbook::{
    DiffOutcome, OrderBookSynchronizer, PriceLevelSet, Side, SyncPhase, SyncState, SyncStatus,
};
pub use parser::{DepthUpdate, OrderBookSnapshot, ParsedMessage, PriceLevel};
pub use session::SyncSession;
pub use snapshot::{RestSnapshotLoader, SnapshotLoader};
pub use store::{MemorySink, RedisSink, StoreSink, StoreWriter};
pub use websocket::{DiffStream, StreamConnector, WebSocketClient, WebSocketConnector};
