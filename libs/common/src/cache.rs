//! Redis cache module for the box rental service
//!
//! This module provides functionality for connecting to Redis and performing
//! basic cache operations like get and set with TTL support.

use crate::error::{StoreError, StoreResult};
use redis::{AsyncCommands, Client, RedisError, aio::MultiplexedConnection};
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Prefix prepended to every key written through the pool
    pub key_prefix: String,
    /// Upper bound on one call, connecting included (seconds)
    pub query_timeout: u64,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_KEY_PREFIX`: Key namespace (default: "boxrent")
    /// - `REDIS_QUERY_TIMEOUT`: Per-call timeout in seconds (default: 5)
    pub fn from_env() -> StoreResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let key_prefix =
            std::env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "boxrent".to_string());
        let query_timeout = std::env::var("REDIS_QUERY_TIMEOUT")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u64>()
            .map_err(|e| {
                StoreError::Configuration(format!("Invalid REDIS_QUERY_TIMEOUT: {}", e))
            })?;

        if query_timeout == 0 {
            return Err(StoreError::Configuration(
                "REDIS_QUERY_TIMEOUT must be greater than zero".to_string(),
            ));
        }

        Ok(RedisConfig {
            url,
            key_prefix,
            query_timeout,
        })
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

/// Redis client handle
///
/// Every call opens a multiplexed connection and runs under the configured
/// timeout, so a server that accepts connections but never answers surfaces
/// as `StoreError::Timeout`.
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    key_prefix: String,
    timeout: Duration,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub fn new(config: &RedisConfig) -> StoreResult<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool {
            client,
            key_prefix: config.key_prefix.clone(),
            timeout: config.query_timeout(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// Run `op` on a fresh connection, bounded by the pool timeout
    async fn with_connection<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let call = async {
            let conn = self.client.get_multiplexed_async_connection().await?;
            op(conn).await
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Set a key-value pair in Redis with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        let key = self.key(key);
        self.with_connection(|mut conn| async move {
            match ttl_seconds {
                Some(ttl) => conn.set_ex(key, value, ttl).await,
                None => conn.set(key, value).await,
            }
        })
        .await
    }

    /// Overwrite a key only if it still exists. Returns whether it was written.
    pub async fn set_existing(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> StoreResult<bool> {
        let key = self.key(key);
        self.with_connection(|mut conn| async move {
            let written: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("XX")
                .arg("EX")
                .arg(ttl_seconds)
                .query_async(&mut conn)
                .await?;
            Ok(written.is_some())
        })
        .await
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = self.key(key);
        self.with_connection(|mut conn| async move { conn.get(key).await }).await
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let key = self.key(key);
        self.with_connection(|mut conn| async move {
            let _: u64 = conn.del(key).await?;
            Ok(())
        })
        .await
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> StoreResult<bool> {
        let pong: String = self
            .with_connection(|mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use std::env;
    use tokio::net::TcpListener;

    fn local_config() -> RedisConfig {
        RedisConfig {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "boxrent-test".to_string(),
            query_timeout: 5,
        }
    }

    #[test]
    fn test_keys_are_namespaced() {
        let pool = RedisPool::new(&local_config()).expect("valid redis url");
        assert_eq!(pool.key("session:abc"), "boxrent-test:session:abc");
    }

    #[test]
    #[serial]
    fn test_query_timeout_from_env() {
        unsafe {
            env::remove_var("REDIS_QUERY_TIMEOUT");
        }
        assert_eq!(
            RedisConfig::from_env().unwrap().query_timeout(),
            Duration::from_secs(5)
        );

        unsafe {
            env::set_var("REDIS_QUERY_TIMEOUT", "2");
        }
        assert_eq!(
            RedisConfig::from_env().unwrap().query_timeout(),
            Duration::from_secs(2)
        );

        unsafe {
            env::set_var("REDIS_QUERY_TIMEOUT", "0");
        }
        assert!(matches!(
            RedisConfig::from_env(),
            Err(StoreError::Configuration(_))
        ));

        unsafe {
            env::remove_var("REDIS_QUERY_TIMEOUT");
        }
    }

    /// Accepts connections and never writes a byte back
    async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("redis://{}", addr)
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let pool = RedisPool {
            client: Client::open(silent_server().await).unwrap(),
            key_prefix: "boxrent-test".to_string(),
            timeout: Duration::from_millis(200),
        };

        let outcome = tokio::time::timeout(Duration::from_secs(10), pool.get("session:x"))
            .await
            .expect("call is bounded by the pool timeout");
        assert!(matches!(outcome, Err(StoreError::Timeout(_))));

        let outcome = tokio::time::timeout(Duration::from_secs(10), pool.health_check())
            .await
            .expect("call is bounded by the pool timeout");
        assert!(matches!(outcome, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_set_get_delete() -> StoreResult<()> {
        let pool = RedisPool::new(&local_config())?;
        assert!(pool.health_check().await?);

        let key = "test_key";
        let value = "test_value";
        pool.set(key, value, Some(5)).await?;

        let retrieved = pool.get(key).await?;
        assert_eq!(retrieved, Some(value.to_string()));

        assert!(pool.set_existing(key, "updated", 5).await?);
        assert_eq!(pool.get(key).await?, Some("updated".to_string()));

        pool.delete(key).await?;
        let retrieved = pool.get(key).await?;
        assert_eq!(retrieved, None);
        assert!(!pool.set_existing(key, "resurrected", 5).await?);
        assert_eq!(pool.get(key).await?, None);

        Ok(())
    }
}
