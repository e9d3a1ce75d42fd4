//! Counter store port.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// Outcome of registering one attempt inside a counting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Counter value after this attempt.
    pub count: i64,
    /// Time left until the window resets.
    pub ttl: Duration,
}

/// Counter store trait - key/value counters with expiry (Redis, in-memory).
///
/// Implementations must never expose a key after its expiry elapsed.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Get the current value. A missing key is `Ok(None)`, never an error.
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Overwrite a value, optionally expiring it after `expire`.
    async fn set(&self, key: &str, value: i64, expire: Option<Duration>) -> Result<(), StoreError>;

    /// Increment a counter, treating a missing key as 0.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Set an expiry on an existing key. Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete a key. Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remaining time to live; `None` for missing keys or keys without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Count one attempt in the window stored under `key`.
    ///
    /// Starts a new window of length `window` when the counter is new or has
    /// no expiry. Backends override this to make the whole step atomic.
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError> {
        let count = self.increment(key).await?;
        if count == 1 {
            self.expire(key, window).await?;
            return Ok(WindowHit { count, ttl: window });
        }

        let ttl = match self.ttl(key).await? {
            Some(ttl) => ttl,
            None => {
                // Counter survived without expiry; never let it extend a ban forever.
                self.expire(key, window).await?;
                window
            }
        };

        Ok(WindowHit { count, ttl })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MapStore;

    #[tokio::test]
    async fn test_default_hit_starts_window() {
        let store = MapStore::default();
        let hit = store.hit("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(hit.count, 1);
        assert_eq!(hit.ttl, Duration::from_secs(60));
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(60)));

        let hit = store.hit("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(hit.count, 2);
    }

    #[tokio::test]
    async fn test_default_hit_repairs_missing_expiry() {
        let store = MapStore::default();
        store.set("k", 5, None).await.unwrap();

        let hit = store.hit("k", Duration::from_secs(30)).await.unwrap();
        assert_eq!(hit.count, 6);
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(30)));
    }
}
