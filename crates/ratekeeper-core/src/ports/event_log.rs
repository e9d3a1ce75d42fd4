//! Event log port - bounded record of rate limit checks.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{RateLimitEvent, SuspiciousIp};
use crate::error::EventLogError;

/// Event log trait - append-only, bounded storage of check outcomes.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event, applying retention.
    async fn log_event(&self, event: &RateLimitEvent) -> Result<(), EventLogError>;

    /// Most recent events, newest first.
    async fn recent_events(&self, limit: usize) -> Result<Vec<RateLimitEvent>, EventLogError>;

    /// IPs with the most flagged events, highest count first.
    async fn suspicious_ips(&self, limit: usize) -> Result<Vec<SuspiciousIp>, EventLogError>;

    /// Suspicious events recorded for one IP, newest first. These outlive
    /// the main log's retention.
    async fn flagged_events(
        &self,
        ip: &str,
        limit: usize,
    ) -> Result<Vec<RateLimitEvent>, EventLogError>;

    /// Remove events older than `older_than`. Returns the number removed.
    async fn clear_old_events(&self, older_than: Duration) -> Result<usize, EventLogError>;
}
