//! Fixed-window rate limiting over a [`CounterStore`].

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{RateLimitPolicy, RateLimitResult};
use crate::error::StoreError;
use crate::ports::CounterStore;

/// Transport-independent fixed-window limiter.
///
/// Every attempt is counted before the verdict, so rejected attempts
/// still consume quota. A request is denied once the count exceeds
/// the policy max.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Arc<dyn CounterStore>,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Count one attempt for `identifier` under `policy`.
    pub async fn check(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitResult, StoreError> {
        let key = policy.key_for(identifier);
        let hit = self.store.hit(&key, policy.window()).await?;
        Ok(RateLimitResult::from_hit(hit, policy.max(), Utc::now()))
    }

    /// Forget the current window for `identifier`.
    pub async fn reset(&self, identifier: &str, policy: &RateLimitPolicy) -> Result<bool, StoreError> {
        self.store.delete(&policy.key_for(identifier)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MapStore;
    use std::time::Duration;

    fn limiter() -> FixedWindowLimiter {
        FixedWindowLimiter::new(Arc::new(MapStore::default()))
    }

    #[tokio::test]
    async fn test_first_max_checks_succeed_then_deny() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new("api", Duration::from_secs(60), 3).unwrap();

        let mut remaining = Vec::new();
        for _ in 0..3 {
            let result = limiter.check("1.2.3.4", &policy).await.unwrap();
            assert!(result.success);
            remaining.push(result.remaining);
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.check("1.2.3.4", &policy).await.unwrap();
        assert!(!denied.success);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after, Some(60));
    }

    #[tokio::test]
    async fn test_identifiers_and_prefixes_are_isolated() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new("api", Duration::from_secs(60), 1).unwrap();
        let other = policy.clone().with_key_prefix("rl:other:");

        assert!(limiter.check("a", &policy).await.unwrap().success);
        assert!(!limiter.check("a", &policy).await.unwrap().success);
        assert!(limiter.check("b", &policy).await.unwrap().success);
        assert!(limiter.check("a", &other).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_reset_restores_quota() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new("auth", Duration::from_secs(60), 1).unwrap();

        limiter.check("a", &policy).await.unwrap();
        assert!(limiter.reset("a", &policy).await.unwrap());
        let result = limiter.check("a", &policy).await.unwrap();
        assert!(result.success);
        assert_eq!(result.remaining, 0);
    }
}
