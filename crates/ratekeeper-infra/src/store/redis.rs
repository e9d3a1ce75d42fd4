//! Redis counter store - shared across instances, atomic increments.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult, Script};

use ratekeeper_core::StoreError;
use ratekeeper_core::ports::{CounterStore, WindowHit};

use crate::config::RedisConfig;

/// Redis-backed counter store.
///
/// Uses connection manager for automatic reconnection. Every command is
/// bounded by `operation_timeout`.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisConfig,
    /// Lua script for atomic increment with window expiry
    hit_script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        let conn = connect(&config).await?;

        // Returns: [current_count, pttl_remaining]
        let hit_script = Script::new(
            r#"
            local key = KEYS[1]
            local window_ms = tonumber(ARGV[1])

            local current = redis.call('INCR', key)
            local ttl = redis.call('PTTL', key)
            if current == 1 or ttl < 0 then
                redis.call('PEXPIRE', key, window_ms)
                ttl = window_ms
            end

            return {current, ttl}
            "#,
        );

        tracing::info!(url = %config.url, "Connected to Redis counter store");

        Ok(Self {
            conn,
            config,
            hit_script,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisConfig::from_env()).await
    }

    async fn run<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T, StoreError> {
        tokio::time::timeout(self.config.operation_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.config.operation_timeout))?
            .map_err(|e| StoreError::Operation(e.to_string()))
    }
}

/// Open a connection manager, bounded by the configured connect timeout.
pub(crate) async fn connect(config: &RedisConfig) -> Result<ConnectionManager, StoreError> {
    let client =
        Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

    // Use timeout to prevent hanging if Redis is unreachable
    let conn_manager_fut = ConnectionManager::new(client);
    tokio::time::timeout(config.connect_timeout, conn_manager_fut)
        .await
        .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
        .map_err(|e| StoreError::Connection(e.to_string()))
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        self.run(conn.get::<_, Option<i64>>(key)).await
    }

    async fn set(&self, key: &str, value: i64, expire: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match expire {
            Some(ttl) => {
                self.run(conn.pset_ex::<_, _, ()>(key, value, millis(ttl) as u64))
                    .await
            }
            None => self.run(conn.set::<_, _, ()>(key, value)).await,
        }
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.run(conn.incr::<_, _, i64>(key, 1)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        self.run(conn.pexpire::<_, bool>(key, millis(ttl))).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self.run(conn.del::<_, i64>(key)).await?;
        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        // -2: missing key, -1: no expiry
        let pttl: i64 = self.run(conn.pttl::<_, i64>(key)).await?;
        Ok(u64::try_from(pttl).ok().map(Duration::from_millis))
    }

    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError> {
        let mut conn = self.conn.clone();
        let window_ms = millis(window);

        let result: Vec<i64> = self
            .run(
                self.hit_script
                    .key(key)
                    .arg(window_ms)
                    .invoke_async(&mut conn),
            )
            .await?;

        let count = result.first().copied().unwrap_or(1);
        let ttl_ms = result.get(1).copied().unwrap_or(window_ms).max(0);

        Ok(WindowHit {
            count,
            ttl: Duration::from_millis(ttl_ms as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_test_store() -> Option<RedisCounterStore> {
        let config = RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
            connect_timeout: Duration::from_secs(1),
            operation_timeout: Duration::from_secs(1),
            fallback_to_memory: false,
        };

        RedisCounterStore::new(config).await.ok()
    }

    #[tokio::test]
    async fn test_redis_counter_store_basics() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => {
                tracing::warn!("Redis not available, skipping test");
                return;
            }
        };

        let key = "test_counter_basics";
        store.delete(key).await.unwrap();

        assert_eq!(store.get(key).await.unwrap(), None);
        assert_eq!(store.increment(key).await.unwrap(), 1);
        assert_eq!(store.ttl(key).await.unwrap(), None);
        assert!(store.expire(key, Duration::from_secs(10)).await.unwrap());
        assert!(store.ttl(key).await.unwrap().is_some());
        assert!(store.delete(key).await.unwrap());
        assert!(!store.delete(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_redis_hit_window() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };

        let key = "test_counter_hit";
        store.delete(key).await.unwrap();
        let window = Duration::from_secs(1);

        assert_eq!(store.hit(key, window).await.unwrap().count, 1);
        assert_eq!(store.hit(key, window).await.unwrap().count, 2);

        // Wait for reset
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(store.hit(key, window).await.unwrap().count, 1);
    }
}
