//! In-memory counter store - used as fallback when Redis is unavailable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use ratekeeper_core::StoreError;
use ratekeeper_core::ports::{CounterStore, WindowHit};

struct CounterEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    fn ttl(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|exp| exp.saturating_duration_since(now))
    }
}

/// In-memory counter store using a HashMap behind an async RwLock.
///
/// This is the fallback implementation when Redis is not available.
/// Note: Counters are per-process. Running several instances with this
/// store multiplies the effective limit; use Redis in production.
pub struct InMemoryCounterStore {
    store: RwLock<HashMap<String, CounterEntry>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }

    /// Remove every expired counter. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired(now));
        before - store.len()
    }

    /// Number of live counters.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let store = self.store.read().await;
        store.values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Spawn a task purging expired counters every `every`.
    ///
    /// The task holds a weak reference and stops once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired rate limit counters");
                }
            }
        })
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = Instant::now();
        let store = self.store.read().await;
        let Some(entry) = store.get(key) else {
            return Ok(None);
        };

        if entry.is_expired(now) {
            drop(store);
            // Clean up expired entry with write lock
            let mut store = self.store.write().await;
            if store.get(key).is_some_and(|e| e.is_expired(now)) {
                store.remove(key);
            }
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: i64, expire: Option<Duration>) -> Result<(), StoreError> {
        let mut store = self.store.write().await;
        store.insert(
            key.to_string(),
            CounterEntry {
                value,
                expires_at: expire.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut store = self.store.write().await;
        let entry = store.entry(key.to_string()).or_insert(CounterEntry {
            value: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.value = 0;
            entry.expires_at = None;
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut store = self.store.write().await;
        match store.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            Some(_) => {
                store.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut store = self.store.write().await;
        Ok(store
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let store = self.store.read().await;
        Ok(store
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.ttl(now)))
    }

    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError> {
        let now = Instant::now();
        let mut store = self.store.write().await;

        let entry = store.entry(key.to_string()).or_insert(CounterEntry {
            value: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.value = 0;
            entry.expires_at = None;
        }

        entry.value += 1;
        let expires_at = *entry.expires_at.get_or_insert(now + window);

        Ok(WindowHit {
            count: entry.value,
            ttl: expires_at.saturating_duration_since(now),
        })
    }
}
