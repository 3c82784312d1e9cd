//! Error types for the depth synchronizer

use thiserror::Error;

/// Reasons a snapshot fetch can fail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by exchange (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("invalid instrument: {0}")]
    InvalidInstrument(String),
}

/// Synchronizer errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Failed to parse message: {0}")]
    Parse(String),

    #[error("Sequence gap: expected update {expected}, got {first}..={last}")]
    SequenceGap { expected: u64, first: u64, last: u64 },

    #[error("Store write error: {0}")]
    StoreWrite(String),

    #[error("Snapshot fetch failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Order book has not been seeded")]
    NotSeeded,
}

impl SyncError {
    /// Whether this error ends the current synchronization session.
    ///
    /// Parse errors only cost the offending event and store errors are
    /// absorbed by the persistence adapter, so neither is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Parse(_) | SyncError::StoreWrite(_))
    }

    /// Whether re-running the session can fix this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SyncError::Snapshot(SnapshotError::InvalidInstrument(_))
                | SyncError::Config(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Snapshot(SnapshotError::Network(err.to_string()))
    }
}

impl From<redis::RedisError> for SyncError {
    fn from(err: redis::RedisError) -> Self {
        SyncError::StoreWrite(err.to_string())
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!SyncError::Parse("bad".into()).is_fatal());
        assert!(!SyncError::StoreWrite("down".into()).is_fatal());
        assert!(SyncError::Transport("closed".into()).is_fatal());
        assert!(SyncError::SequenceGap {
            expected: 102,
            first: 103,
            last: 104
        }
        .is_fatal());
    }

    #[test]
    fn test_invalid_instrument_is_not_retried() {
        let err = SyncError::from(SnapshotError::InvalidInstrument("FOO".into()));
        assert!(!err.is_retryable());
        assert!(SyncError::from(SnapshotError::RateLimited { status: 429 }).is_retryable());
        assert!(SyncError::ConnectionTimeout.is_retryable());
    }
}
