//! Parser module for Binance depth messages
//!
//! Handles deserialization of depth diff events and REST snapshots.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::error::{Result, SyncError};

/// Event type carried by diff depth frames
pub const DEPTH_UPDATE_EVENT: &str = "depthUpdate";

/// Binance depth update message
#[derive(Debug, Clone, Deserialize)]
pub struct DepthUpdate {
    /// Event type
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time (milliseconds)
    #[serde(rename = "E")]
    pub event_time: u64,

    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,

    /// First update ID in event
    #[serde(rename = "U")]
    pub first_update_id: u64,

    /// Final update ID in event
    #[serde(rename = "u")]
    pub final_update_id: u64,

    /// Bids to update
    #[serde(rename = "b", deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    /// Asks to update
    #[serde(rename = "a", deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

impl DepthUpdate {
    /// Reject events whose update range is inverted
    pub fn validate(&self) -> Result<()> {
        if self.first_update_id > self.final_update_id {
            return Err(SyncError::Parse(format!(
                "first update id {} is after final update id {}",
                self.first_update_id, self.final_update_id
            )));
        }
        Ok(())
    }
}

/// Price level (price, quantity pair)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Order book snapshot from REST API
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookSnapshot {
    /// Last update ID
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,

    /// Bids
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    /// Asks
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Combined stream message wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    /// Stream name
    pub stream: String,

    /// Data payload
    pub data: serde_json::Value,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    DepthUpdate(DepthUpdate),
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message
    ///
    /// Frames that are not depth updates come back as `Unknown`; a depth
    /// update that fails to decode is a `Parse` error.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        // Combined streams wrap the payload
        let payload = match serde_json::from_value::<StreamMessage>(value.clone()) {
            Ok(stream_msg) => stream_msg.data,
            Err(_) => value,
        };

        let is_depth = payload
            .get("e")
            .and_then(|e| e.as_str())
            .map(|e| e == DEPTH_UPDATE_EVENT)
            .unwrap_or(false);

        if !is_depth {
            return Ok(ParsedMessage::Unknown(raw.to_string()));
        }

        let depth: DepthUpdate = serde_json::from_value(payload)?;
        depth.validate()?;
        Ok(ParsedMessage::DepthUpdate(depth))
    }
}

/// Custom deserializer for price levels from array of string pairs
fn deserialize_price_levels<'de, D>(deserializer: D) -> std::result::Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() != 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            let level = PriceLevel {
                price: Decimal::from_str(&pair[0]).map_err(serde::de::Error::custom)?,
                quantity: Decimal::from_str(&pair[1]).map_err(serde::de::Error::custom)?,
            };
            if level.quantity.is_sign_negative() && !level.quantity.is_zero() {
                return Err(serde::de::Error::custom("Negative quantity"));
            }
            Ok(level)
        })
        .collect()
}
