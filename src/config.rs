//! Configuration module for the depth synchronizer

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::dispatcher::DEFAULT_QUEUE_CAPACITY;
use crate::error::{Result, SyncError};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Instrument to track (e.g., "ethbtc")
    pub symbol: String,

    /// WebSocket endpoint for Binance
    pub ws_endpoint: String,

    /// REST API endpoint for snapshots
    pub rest_endpoint: String,

    /// Number of levels per side requested in the snapshot
    pub snapshot_limit: u32,

    /// Redis address as host:port
    pub redis_host: String,

    /// Redis password, empty for none
    pub redis_password: String,

    /// Redis logical database index
    pub redis_db: i64,

    /// Capacity of the diff queue between the stream reader and the book
    pub queue_capacity: usize,

    /// Timeout for the stream dial, snapshot fetch and store connect
    pub connect_timeout_ms: u64,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,

    /// Port of the health/metrics HTTP server
    pub health_port: u16,
}

impl Config {
    /// Load configuration from `.env` and environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env(None)
    }

    /// Build configuration from defaults overlaid with environment values.
    ///
    /// `source` replaces the process environment when given.
    pub fn from_env(source: Option<HashMap<String, String>>) -> Result<Self> {
        let defaults = Self::default();
        let settings = config::Config::builder()
            .set_default("symbol", defaults.symbol)?
            .set_default("ws_endpoint", defaults.ws_endpoint)?
            .set_default("rest_endpoint", defaults.rest_endpoint)?
            .set_default("snapshot_limit", i64::from(defaults.snapshot_limit))?
            .set_default("redis_host", defaults.redis_host)?
            .set_default("redis_password", defaults.redis_password)?
            .set_default("redis_db", defaults.redis_db)?
            .set_default("queue_capacity", defaults.queue_capacity as i64)?
            .set_default("connect_timeout_ms", defaults.connect_timeout_ms as i64)?
            .set_default("reconnect_delay_ms", defaults.reconnect_delay_ms as i64)?
            .set_default(
                "max_reconnect_attempts",
                i64::from(defaults.max_reconnect_attempts),
            )?
            .set_default("health_port", i64::from(defaults.health_port))?
            .add_source(config::Environment::default().try_parsing(true).source(source))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Override the tracked instrument (CLI argument)
    pub fn with_symbol(mut self, symbol: &str) -> Result<Self> {
        self.symbol = symbol.trim().to_string();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(SyncError::Config("symbol must not be empty".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(SyncError::Config("queue_capacity must be positive".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SyncError::Config(
                "connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.snapshot_limit == 0 {
            return Err(SyncError::Config("snapshot_limit must be positive".to_string()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn redis_password(&self) -> Option<&str> {
        if self.redis_password.is_empty() {
            None
        } else {
            Some(&self.redis_password)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: "ethbtc".to_string(),
            ws_endpoint: "wss://stream.binance.com:9443/ws".to_string(),
            rest_endpoint: "https://api.binance.com/api/v3".to_string(),
            snapshot_limit: 100,
            redis_host: "localhost:6379".to_string(),
            redis_password: String::new(),
            redis_db: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            connect_timeout_ms: 10_000,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 10,
            health_port: 9090,
        }
    }
}
