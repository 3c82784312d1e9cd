//! WebSocket client for Binance depth streams
//!
//! Handles connection, keepalive, and message reception.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, trace, warn};

use super::{DiffStream, StreamConnector};
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::parser::{DepthUpdate, ParsedMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Silence after which the connection is probed with a ping
const RECV_TIMEOUT: Duration = Duration::from_secs(45);

/// WebSocket client for one instrument's diff stream
pub struct WebSocketClient {
    stream: Option<WsStream>,
    url: String,
    closed: bool,
    last_message: Instant,
}

impl WebSocketClient {
    /// Create a new WebSocket client
    pub fn new(endpoint: &str, symbol: &str) -> Self {
        Self {
            stream: None,
            url: stream_url(endpoint, symbol),
            closed: false,
            last_message: Instant::now(),
        }
    }

    /// Create a client and dial it within `dial_timeout`
    pub async fn connect_with_timeout(
        endpoint: &str,
        symbol: &str,
        dial_timeout: Duration,
    ) -> Result<Self> {
        let mut client = Self::new(endpoint, symbol);
        timeout(dial_timeout, client.connect())
            .await
            .map_err(|_| SyncError::ConnectionTimeout)??;
        Ok(client)
    }

    /// Connect to the WebSocket endpoint
    pub async fn connect(&mut self) -> Result<()> {
        info!(url = %self.url, "Connecting to Binance WebSocket");

        let (ws_stream, response) = connect_async(&self.url).await.map_err(|e| {
            SyncError::Transport(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");
        self.stream = Some(ws_stream);
        self.closed = false;
        self.last_message = Instant::now();

        Ok(())
    }

    /// Receive the next message
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SyncError::Transport("Not connected".to_string()))?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Some(text))
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                if let Some(stream) = self.stream.as_mut() {
                    let _ = stream.send(Message::Pong(data)).await;
                }
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(SyncError::Transport("Connection closed".to_string()))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                Err(SyncError::Transport(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(SyncError::Transport("Stream ended".to_string()))
            }
        }
    }

    /// Send a ping to keep connection alive
    pub async fn ping(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .send(Message::Ping(vec![]))
                .await
                .map_err(|e| SyncError::Transport(e.to_string()))?;
        }
        Ok(())
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait]
impl DiffStream for WebSocketClient {
    async fn next_update(&mut self) -> Result<Option<DepthUpdate>> {
        loop {
            if self.closed {
                return Ok(None);
            }

            // Use timeout to detect stale connections
            let text = match timeout(RECV_TIMEOUT, self.recv()).await {
                Ok(Ok(Some(text))) => text,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        last_message_secs = self.last_message.elapsed().as_secs(),
                        "No message received within timeout, sending keepalive"
                    );
                    if let Err(e) = self.ping().await {
                        warn!(error = %e, "Failed to send keepalive ping");
                        return Err(SyncError::ConnectionTimeout);
                    }
                    continue;
                }
            };
            self.last_message = Instant::now();

            match ParsedMessage::parse(&text)? {
                ParsedMessage::DepthUpdate(update) => return Ok(Some(update)),
                ParsedMessage::Unknown(msg) => {
                    trace!(msg = %msg, "Ignoring non-depth message");
                }
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}

/// Dials the diff depth stream within the configured connect timeout
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
    dial_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: config.ws_endpoint.clone(),
            dial_timeout: config.connect_timeout(),
        }
    }
}

#[async_trait]
impl StreamConnector for WebSocketConnector {
    type Stream = WebSocketClient;

    async fn connect(&self, symbol: &str) -> Result<WebSocketClient> {
        WebSocketClient::connect_with_timeout(&self.endpoint, symbol, self.dial_timeout).await
    }
}

/// Raw diff depth stream for one symbol
fn stream_url(endpoint: &str, symbol: &str) -> String {
    format!(
        "{}/{}@depth",
        endpoint.trim_end_matches('/'),
        symbol.to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url() {
        assert_eq!(
            stream_url("wss://stream.binance.com:9443/ws/", "ETHBTC"),
            "wss://stream.binance.com:9443/ws/ethbtc@depth"
        );
    }

    #[tokio::test]
    async fn test_closed_client_yields_none() {
        let mut client = WebSocketClient::new("wss://stream.binance.com:9443/ws", "ethbtc");
        assert!(!client.is_connected());
        client.close().await;
        assert!(matches!(client.next_update().await, Ok(None)));
    }

    #[tokio::test]
    async fn test_recv_without_connection_is_transport_error() {
        let mut client = WebSocketClient::new("wss://stream.binance.com:9443/ws", "ethbtc");
        assert!(matches!(client.recv().await, Err(SyncError::Transport(_))));
    }
}
