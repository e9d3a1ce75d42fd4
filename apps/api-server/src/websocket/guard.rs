//! WebSocket connection and message limits.
//!
//! Connections are counted per IP through the shared limiter. Early in a
//! window, a reconnect storm may overshoot the limit by a burst allowance,
//! at most once per window. Messages are limited per connection with an
//! in-process GCRA limiter and a size cap.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};

use ratekeeper_core::domain::{RateLimitPolicy, RateLimitResult, RequestMeta};
use ratekeeper_infra::{RateLimitService, Verdict};

type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// WebSocket limits configuration.
#[derive(Debug, Clone)]
pub struct WsLimits {
    /// Messages larger than this are dropped.
    pub max_message_bytes: usize,
    /// Steady per-connection message rate.
    pub messages_per_second: u32,
    /// Messages a connection may send at once above the steady rate.
    pub message_burst: u32,
    /// Consecutive dropped messages before the connection is closed.
    pub max_violations: u32,
    /// Extra share of the connection limit a window may overshoot by.
    pub burst_factor: f64,
    /// How long after a window opens the overshoot is granted.
    pub burst_duration: Duration,
}

impl Default for WsLimits {
    fn default() -> Self {
        Self {
            max_message_bytes: 64 * 1024,
            messages_per_second: 10,
            message_burst: 20,
            max_violations: 5,
            burst_factor: 0.5,
            burst_duration: Duration::from_secs(10),
        }
    }
}

impl WsLimits {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_message_bytes: env_parse("WS_MAX_MESSAGE_BYTES", defaults.max_message_bytes),
            messages_per_second: env_parse("WS_MESSAGES_PER_SECOND", defaults.messages_per_second),
            message_burst: env_parse("WS_MESSAGE_BURST", defaults.message_burst),
            max_violations: env_parse("WS_MAX_VIOLATIONS", defaults.max_violations),
            burst_factor: env_parse("WS_BURST_FACTOR", defaults.burst_factor),
            burst_duration: Duration::from_millis(env_parse("WS_BURST_DURATION_MS", 10_000)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Outcome of a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Refused { retry_after: u64 },
}

/// Why a message was not delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    TooLarge { size: usize, max: usize },
    TooFrequent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageVerdict {
    Accept,
    Drop(DropReason),
    /// The violation limit was reached; close the connection.
    Close(DropReason),
}

/// Connection-level WebSocket rate limiter.
pub struct WsRateLimiter {
    limiter: Arc<RateLimitService>,
    policy: Arc<RateLimitPolicy>,
    burst_allowance: u32,
    limits: WsLimits,
}

impl WsRateLimiter {
    pub fn new(
        limiter: Arc<RateLimitService>,
        policy: Arc<RateLimitPolicy>,
        limits: WsLimits,
    ) -> Self {
        let burst_allowance =
            (f64::from(policy.max()) * limits.burst_factor.max(0.0)).floor() as u32;

        Self {
            limiter,
            policy,
            burst_allowance,
            limits,
        }
    }

    pub fn limits(&self) -> &WsLimits {
        &self.limits
    }

    /// Connections a window may admit above the policy max.
    pub fn burst_allowance(&self) -> u32 {
        self.burst_allowance
    }

    /// Whether a denied attempt still fits the window's burst allowance.
    ///
    /// The steady counter keeps counting denied attempts, so the overshoot
    /// is bounded by `max + burst_allowance` per window.
    fn within_burst(&self, result: &RateLimitResult) -> bool {
        let left = Duration::from_secs(result.retry_after.unwrap_or(0));
        let elapsed = self.policy.window().saturating_sub(left);

        result.count <= u64::from(result.limit) + u64::from(self.burst_allowance)
            && elapsed <= self.limits.burst_duration
    }

    /// Count a connection attempt from `ip`.
    pub async fn admit(&self, ip: Option<&str>) -> Admission {
        let meta = RequestMeta::new(ip.map(str::to_string), "/socket.io", "CONNECT");

        let result = match self.limiter.check(&self.policy, &meta).await {
            Verdict::Denied(result) => result,
            Verdict::Allowed(_) | Verdict::Skipped | Verdict::FailedOpen => {
                return Admission::Accepted;
            }
        };

        if self.within_burst(&result) {
            tracing::debug!(ip = %meta.ip_or_unknown(), count = result.count, "WebSocket connection admitted on burst allowance");
            return Admission::Accepted;
        }

        tracing::warn!(ip = %meta.ip_or_unknown(), "WebSocket connection refused");
        Admission::Refused {
            retry_after: result.retry_after.unwrap_or(1),
        }
    }

    /// Per-connection message guard.
    pub fn connection_guard(&self) -> ConnectionGuard {
        ConnectionGuard::new(&self.limits)
    }
}

/// Message limits of a single connection.
pub struct ConnectionGuard {
    limiter: DirectRateLimiter,
    max_message_bytes: usize,
    max_violations: u32,
    violations: AtomicU32,
}

impl ConnectionGuard {
    pub fn new(limits: &WsLimits) -> Self {
        let rate = NonZeroU32::new(limits.messages_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(limits.message_burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(burst);

        Self {
            limiter: DirectRateLimiter::direct(quota),
            max_message_bytes: limits.max_message_bytes,
            max_violations: limits.max_violations.max(1),
            violations: AtomicU32::new(0),
        }
    }

    /// Check an inbound message of `size` bytes.
    pub fn check_message(&self, size: usize) -> MessageVerdict {
        let reason = if size > self.max_message_bytes {
            DropReason::TooLarge {
                size,
                max: self.max_message_bytes,
            }
        } else if self.limiter.check().is_err() {
            DropReason::TooFrequent
        } else {
            self.violations.store(0, Ordering::Relaxed);
            return MessageVerdict::Accept;
        };

        let violations = self.violations.fetch_add(1, Ordering::Relaxed) + 1;
        if violations >= self.max_violations {
            MessageVerdict::Close(reason)
        } else {
            MessageVerdict::Drop(reason)
        }
    }
}
