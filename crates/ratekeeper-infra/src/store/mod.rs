//! Counter store implementations - Redis and in-memory fallback.

mod memory;

pub use memory::InMemoryCounterStore;

#[cfg(feature = "redis")]
pub(crate) mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisCounterStore;

use std::sync::Arc;

use tokio::sync::OnceCell;

use ratekeeper_core::StoreError;
use ratekeeper_core::ports::CounterStore;

use crate::config::{StoreConfig, StoreMode};

/// Build the configured counter store.
///
/// Falls back to the in-memory store when Redis is unreachable and
/// `fallback_to_memory` is set; otherwise the connection error is returned.
pub async fn connect_counter_store(
    config: &StoreConfig,
) -> Result<Arc<dyn CounterStore>, StoreError> {
    match config.mode {
        StoreMode::Memory => {
            tracing::info!("Using in-memory counter store (single instance only)");
            Ok(memory_store(config))
        }
        StoreMode::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &StoreConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    match RedisCounterStore::new(config.redis.clone()).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) if config.redis.fallback_to_memory => {
            tracing::error!(
                url = %config.redis.url,
                error = %e,
                "Failed to connect counter store to Redis. Using in-memory fallback."
            );
            Ok(memory_store(config))
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(config: &StoreConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    tracing::warn!("Built without redis feature - using in-memory counter store");
    Ok(memory_store(config))
}

fn memory_store(config: &StoreConfig) -> Arc<dyn CounterStore> {
    let store = Arc::new(InMemoryCounterStore::new());
    store.spawn_sweeper(config.sweep_interval);
    store
}

/// Lazily connects the counter store once and hands out shared handles.
pub struct StoreProvider {
    config: StoreConfig,
    store: OnceCell<Arc<dyn CounterStore>>,
}

impl StoreProvider {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            store: OnceCell::new(),
        }
    }

    /// The shared store, connecting on first use.
    pub async fn get(&self) -> Result<Arc<dyn CounterStore>, StoreError> {
        self.store
            .get_or_try_init(|| connect_counter_store(&self.config))
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_provider_reuses_store() {
        let provider = StoreProvider::new(StoreConfig::default());
        let first = provider.get().await.unwrap();
        let second = provider.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.increment("shared").await.unwrap();
        assert_eq!(second.get("shared").await.unwrap(), Some(1));
    }

    #[cfg(feature = "redis")]
    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let mut config = StoreConfig {
            mode: StoreMode::Redis,
            ..Default::default()
        };
        config.redis.url = "redis://127.0.0.1:1".to_string();
        config.redis.connect_timeout = std::time::Duration::from_millis(200);

        let store = connect_counter_store(&config).await.unwrap();
        assert_eq!(store.increment("k").await.unwrap(), 1);

        config.redis.fallback_to_memory = false;
        assert!(connect_counter_store(&config).await.is_err());
    }
}
