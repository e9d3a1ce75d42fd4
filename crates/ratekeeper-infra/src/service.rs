//! Rate limit service - runs checks, records events and applies the
//! failure mode when the store misbehaves.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use ratekeeper_core::FixedWindowLimiter;
use ratekeeper_core::domain::{
    FailureMode, RateLimitEvent, RateLimitPolicy, RateLimitResult, RequestMeta,
};
use ratekeeper_core::ports::{CounterStore, EventLog};

/// Outcome of a check as seen by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The policy's skip predicate matched. No counter was touched.
    Skipped,
    Allowed(RateLimitResult),
    Denied(RateLimitResult),
    /// The store failed and the policy fails open.
    FailedOpen,
}

impl Verdict {
    pub fn is_denied(&self) -> bool {
        matches!(self, Verdict::Denied(_))
    }

    /// The counted result, if any. Drives the `X-RateLimit-*` headers.
    pub fn result(&self) -> Option<&RateLimitResult> {
        match self {
            Verdict::Allowed(result) | Verdict::Denied(result) => Some(result),
            Verdict::Skipped | Verdict::FailedOpen => None,
        }
    }
}

/// Shared entry point of every adapter.
#[derive(Clone)]
pub struct RateLimitService {
    limiter: FixedWindowLimiter,
    events: Arc<dyn EventLog>,
    /// Upper bound for recording an event on the request path.
    event_timeout: Duration,
}

impl RateLimitService {
    pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn new(store: Arc<dyn CounterStore>, events: Arc<dyn EventLog>) -> Self {
        Self {
            limiter: FixedWindowLimiter::new(store),
            events,
            event_timeout: Self::DEFAULT_EVENT_TIMEOUT,
        }
    }

    pub fn with_event_timeout(mut self, event_timeout: Duration) -> Self {
        self.event_timeout = event_timeout;
        self
    }

    pub fn limiter(&self) -> &FixedWindowLimiter {
        &self.limiter
    }

    pub fn events(&self) -> &Arc<dyn EventLog> {
        &self.events
    }

    /// Check a request against `policy`.
    pub async fn check(&self, policy: &RateLimitPolicy, meta: &RequestMeta) -> Verdict {
        if policy.should_skip(meta) {
            return Verdict::Skipped;
        }
        let identifier = policy.identifier_for(meta);
        self.check_identifier(policy, &identifier, meta).await
    }

    /// Check an explicit identifier, bypassing the policy's skip predicate
    /// and identifier generator.
    pub async fn check_identifier(
        &self,
        policy: &RateLimitPolicy,
        identifier: &str,
        meta: &RequestMeta,
    ) -> Verdict {
        match self.limiter.check(identifier, policy).await {
            Ok(result) => {
                self.record(policy, meta, &result).await;

                if result.success {
                    Verdict::Allowed(result)
                } else {
                    tracing::debug!(
                        identifier,
                        policy = %policy.name(),
                        count = result.count,
                        "Rate limit exceeded"
                    );
                    Verdict::Denied(result)
                }
            }
            Err(e) => {
                tracing::error!(
                    identifier,
                    policy = %policy.name(),
                    error = %e,
                    "Rate limit store error"
                );
                match policy.failure_mode() {
                    FailureMode::Open => Verdict::FailedOpen,
                    FailureMode::Closed => Verdict::Denied(RateLimitResult::unavailable(
                        policy.max(),
                        policy.window(),
                        Utc::now(),
                    )),
                }
            }
        }
    }

    /// Best-effort event write. Never delays the verdict past `event_timeout`.
    async fn record(&self, policy: &RateLimitPolicy, meta: &RequestMeta, result: &RateLimitResult) {
        let event = RateLimitEvent::from_result(meta, policy.name(), result);
        match tokio::time::timeout(self.event_timeout, self.events.log_event(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, policy = %policy.name(), "Failed to record rate limit event");
            }
            Err(_) => {
                tracing::warn!(
                    policy = %policy.name(),
                    timeout_ms = self.event_timeout.as_millis() as u64,
                    "Timed out recording rate limit event"
                );
            }
        }
    }
}
