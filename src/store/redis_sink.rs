//! Redis store sink
//!
//! Each book side is one Redis hash: field = price, value = quantity.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::info;

use super::StoreSink;
use crate::config::Config;
use crate::error::{Result, SyncError};

const DEFAULT_REDIS_PORT: u16 = 6379;

/// Store sink backed by a multiplexed Redis connection
#[derive(Clone)]
pub struct RedisSink {
    conn: MultiplexedConnection,
}

impl RedisSink {
    /// Connect using the configured host, credential and database index
    pub async fn connect(config: &Config) -> Result<Self> {
        let (host, port) = split_host_port(&config.redis_host)?;
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host, port),
            redis: redis::RedisConnectionInfo {
                db: config.redis_db,
                password: config.redis_password().map(str::to_string),
                ..Default::default()
            },
        };

        let client = redis::Client::open(info)?;
        let mut conn = timeout(
            config.connect_timeout(),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| SyncError::ConnectionTimeout)??;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(
            host = %config.redis_host,
            db = config.redis_db,
            reply = %pong,
            "Connected to Redis"
        );

        Ok(Self { conn })
    }
}

#[async_trait]
impl StoreSink for RedisSink {
    async fn upsert(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(key, field).await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

/// Split `host[:port]`, defaulting the port
fn split_host_port(address: &str) -> Result<(String, u16)> {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| {
                SyncError::Config(format!("invalid Redis port in address: {}", address))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((address.to_string(), DEFAULT_REDIS_PORT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("localhost:6379").unwrap(),
            ("localhost".to_string(), 6379)
        );
        assert_eq!(
            split_host_port("cache.internal").unwrap(),
            ("cache.internal".to_string(), DEFAULT_REDIS_PORT)
        );
        assert!(matches!(
            split_host_port("cache:abc"),
            Err(SyncError::Config(_))
        ));
    }
}
