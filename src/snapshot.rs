//! Snapshot loading
//!
//! Fetches the full depth of an instrument together with the update id
//! it corresponds to.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, SnapshotError};
use crate::parser::OrderBookSnapshot;

/// Binance error code for an unknown symbol
const INVALID_SYMBOL_CODE: &str = "-1121";

/// Source of order book snapshots
#[async_trait]
pub trait SnapshotLoader: Send + Sync {
    async fn fetch_snapshot(
        &self,
        symbol: &str,
    ) -> std::result::Result<OrderBookSnapshot, SnapshotError>;
}

/// Loads snapshots from the exchange REST API
pub struct RestSnapshotLoader {
    client: reqwest::Client,
    endpoint: String,
    limit: u32,
}

impl RestSnapshotLoader {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.rest_endpoint.trim_end_matches('/').to_string(),
            limit: config.snapshot_limit,
        })
    }

    pub fn depth_url(&self, symbol: &str) -> String {
        format!(
            "{}/depth?symbol={}&limit={}",
            self.endpoint,
            symbol.to_uppercase(),
            self.limit
        )
    }
}

#[async_trait]
impl SnapshotLoader for RestSnapshotLoader {
    async fn fetch_snapshot(
        &self,
        symbol: &str,
    ) -> std::result::Result<OrderBookSnapshot, SnapshotError> {
        let url = self.depth_url(symbol);
        info!(symbol = %symbol, url = %url, "Fetching order book snapshot");

        let response = self.client.get(&url).send().await.map_err(network_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(symbol = %symbol, status = %status, body = %body, "Snapshot request rejected");
            return Err(classify_rejection(symbol, status, &body));
        }

        let snapshot = response
            .json::<OrderBookSnapshot>()
            .await
            .map_err(network_error)?;

        info!(
            symbol = %symbol,
            last_update_id = snapshot.last_update_id,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Snapshot received"
        );
        Ok(snapshot)
    }
}

fn network_error(err: reqwest::Error) -> SnapshotError {
    if err.is_timeout() {
        SnapshotError::Network(format!("request timed out: {}", err))
    } else {
        SnapshotError::Network(err.to_string())
    }
}

/// Map a non-success response onto the snapshot error taxonomy
fn classify_rejection(symbol: &str, status: StatusCode, body: &str) -> SnapshotError {
    match status {
        // 418 is Binance's IP ban after ignoring 429s
        StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT => SnapshotError::RateLimited {
            status: status.as_u16(),
        },
        StatusCode::BAD_REQUEST if body.contains(INVALID_SYMBOL_CODE) => {
            SnapshotError::InvalidInstrument(symbol.to_uppercase())
        }
        _ => SnapshotError::Network(format!("HTTP {}: {}", status, body)),
    }
}
