//! Event log implementations - Redis and in-memory fallback.

mod memory;

pub use memory::InMemoryEventLog;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisEventLog;

use std::sync::Arc;

use ratekeeper_core::EventLogError;
use ratekeeper_core::ports::EventLog;

use crate::config::{EventLogConfig, StoreConfig, StoreMode};

/// Build the event log on the same backend as the counter store.
pub async fn connect_event_log(
    store: &StoreConfig,
    config: EventLogConfig,
) -> Result<Arc<dyn EventLog>, EventLogError> {
    match store.mode {
        StoreMode::Memory => Ok(Arc::new(InMemoryEventLog::new(config))),
        StoreMode::Redis => connect_redis(store, config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(
    store: &StoreConfig,
    config: EventLogConfig,
) -> Result<Arc<dyn EventLog>, EventLogError> {
    match RedisEventLog::new(&store.redis, config.clone()).await {
        Ok(log) => Ok(Arc::new(log)),
        Err(e) if store.redis.fallback_to_memory => {
            tracing::error!(
                url = %store.redis.url,
                error = %e,
                "Failed to connect event log to Redis. Using in-memory fallback."
            );
            Ok(Arc::new(InMemoryEventLog::new(config)))
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(
    _store: &StoreConfig,
    config: EventLogConfig,
) -> Result<Arc<dyn EventLog>, EventLogError> {
    tracing::warn!("Built without redis feature - using in-memory event log");
    Ok(Arc::new(InMemoryEventLog::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "redis")]
    #[tokio::test]
    async fn test_event_log_falls_back_to_memory() {
        let mut store = StoreConfig {
            mode: StoreMode::Redis,
            ..Default::default()
        };
        store.redis.url = "redis://127.0.0.1:1".to_string();
        store.redis.connect_timeout = std::time::Duration::from_millis(200);

        let log = connect_event_log(&store, EventLogConfig::default())
            .await
            .unwrap();
        assert!(log.recent_events(10).await.unwrap().is_empty());

        store.redis.fallback_to_memory = false;
        assert!(
            connect_event_log(&store, EventLogConfig::default())
                .await
                .is_err()
        );
    }
}
