use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ports::WindowHit;

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Attempts counted in the current window, this one included.
    pub count: u64,
    pub reset_time: DateTime<Utc>,
    /// Seconds until a retry is advisable. Only set when denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitResult {
    /// Apply the deny-iff-`count > limit` rule to a counted attempt.
    pub fn from_hit(hit: WindowHit, limit: u32, now: DateTime<Utc>) -> Self {
        let count = u64::try_from(hit.count).unwrap_or(0);
        let success = count <= u64::from(limit);
        let remaining = u64::from(limit).saturating_sub(count) as u32;

        Self {
            success,
            limit,
            remaining,
            count,
            reset_time: reset_time(now, hit.ttl),
            retry_after: (!success).then(|| retry_after_secs(hit.ttl)),
        }
    }

    /// Denial used when the store is unreachable and the policy fails closed.
    pub fn unavailable(limit: u32, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            success: false,
            limit,
            remaining: 0,
            count: 0,
            reset_time: reset_time(now, window),
            retry_after: Some(retry_after_secs(window)),
        }
    }

    /// Reset time as unix seconds, for `X-RateLimit-Reset`.
    pub fn reset_unix_secs(&self) -> i64 {
        self.reset_time.timestamp()
    }
}

fn reset_time(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now)
}

/// Whole seconds until reset, rounded up, never below one.
fn retry_after_secs(ttl: Duration) -> u64 {
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    millis.div_ceil(1000).max(1)
}
