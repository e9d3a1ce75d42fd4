//! In-memory event log - bounded ring of recent checks.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use ratekeeper_core::EventLogError;
use ratekeeper_core::domain::{RateLimitEvent, SuspiciousIp};
use ratekeeper_core::ports::EventLog;

use crate::config::EventLogConfig;

/// In-memory event log.
///
/// Keeps at most `max_events` events younger than `retention`. Suspicious
/// events are additionally kept per IP for `suspicious_retention`.
/// Note: Data is lost on process restart.
pub struct InMemoryEventLog {
    config: EventLogConfig,
    events: RwLock<VecDeque<RateLimitEvent>>,
    flagged: RwLock<HashMap<String, VecDeque<RateLimitEvent>>>,
}

impl InMemoryEventLog {
    pub fn new(config: EventLogConfig) -> Self {
        Self {
            config,
            events: RwLock::new(VecDeque::new()),
            flagged: RwLock::new(HashMap::new()),
        }
    }

    fn cutoff(age: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn evict(queue: &mut VecDeque<RateLimitEvent>, max: usize, cutoff: DateTime<Utc>) -> usize {
        let before = queue.len();
        queue.retain(|event| event.timestamp >= cutoff);
        while queue.len() > max {
            queue.pop_front();
        }
        before - queue.len()
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new(EventLogConfig::default())
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn log_event(&self, event: &RateLimitEvent) -> Result<(), EventLogError> {
        {
            let mut events = self.events.write().await;
            events.push_back(event.clone());
            Self::evict(
                &mut events,
                self.config.max_events,
                Self::cutoff(self.config.retention),
            );
        }

        if event.exceeded && event.suspicious {
            let mut flagged = self.flagged.write().await;
            let bucket = flagged.entry(event.ip.clone()).or_default();
            bucket.push_back(event.clone());
            Self::evict(
                bucket,
                self.config.max_events,
                Self::cutoff(self.config.suspicious_retention),
            );
        }

        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<RateLimitEvent>, EventLogError> {
        let events = self.events.read().await;
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    async fn suspicious_ips(&self, limit: usize) -> Result<Vec<SuspiciousIp>, EventLogError> {
        let events = self.events.read().await;
        Ok(SuspiciousIp::rank(events.iter(), limit))
    }

    async fn flagged_events(
        &self,
        ip: &str,
        limit: usize,
    ) -> Result<Vec<RateLimitEvent>, EventLogError> {
        let flagged = self.flagged.read().await;
        Ok(flagged
            .get(ip)
            .map(|bucket| bucket.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_old_events(&self, older_than: Duration) -> Result<usize, EventLogError> {
        let removed = {
            let mut events = self.events.write().await;
            let cutoff = Self::cutoff(older_than);
            let before = events.len();
            events.retain(|event| event.timestamp >= cutoff);
            before - events.len()
        };

        let cutoff = Self::cutoff(self.config.suspicious_retention);
        let mut flagged = self.flagged.write().await;
        flagged.retain(|_, bucket| {
            bucket.retain(|event| event.timestamp >= cutoff);
            !bucket.is_empty()
        });

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(ip: &str, exceeded: bool, suspicious: bool, age: Duration) -> RateLimitEvent {
        RateLimitEvent {
            id: Uuid::new_v4(),
            ip: ip.to_string(),
            path: "/api/bookings".to_string(),
            method: "GET".to_string(),
            limiter_type: "api".to_string(),
            timestamp: Utc::now() - chrono::Duration::from_std(age).unwrap(),
            exceeded,
            suspicious,
            remaining: Some(0),
            count: Some(1),
            limit: Some(1),
            retry_after: None,
            reset_time: None,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn test_recent_events_newest_first_and_capped() {
        let log = InMemoryEventLog::new(EventLogConfig {
            max_events: 3,
            ..Default::default()
        });

        for i in 0..5u64 {
            log.log_event(&event("1.1.1.1", false, false, Duration::from_secs(50 - i)))
                .await
                .unwrap();
        }

        let recent = log.recent_events(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(log.recent_events(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retention_evicts_on_write() {
        let log = InMemoryEventLog::new(EventLogConfig {
            retention: Duration::from_secs(60),
            ..Default::default()
        });

        log.log_event(&event("1.1.1.1", false, false, Duration::from_secs(120)))
            .await
            .unwrap();
        log.log_event(&event("1.1.1.1", false, false, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(log.recent_events(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_old_events_counts_removed() {
        let log = InMemoryEventLog::default();
        for age in [10, 20, 3600, 7200] {
            log.log_event(&event("2.2.2.2", true, false, Duration::from_secs(age)))
                .await
                .unwrap();
        }

        let removed = log.clear_old_events(Duration::from_secs(60)).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(log.recent_events(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_suspicious_ips_ranked() {
        let log = InMemoryEventLog::default();
        for _ in 0..12 {
            log.log_event(&event("9.9.9.9", true, true, Duration::ZERO))
                .await
                .unwrap();
        }
        for _ in 0..2 {
            log.log_event(&event("8.8.8.8", true, false, Duration::ZERO))
                .await
                .unwrap();
        }
        log.log_event(&event("7.7.7.7", false, false, Duration::ZERO))
            .await
            .unwrap();

        let ips = log.suspicious_ips(5).await.unwrap();
        assert_eq!(ips.len(), 2);
        assert_eq!(ips[0].ip, "9.9.9.9");
        assert_eq!(ips[0].count, 12);
        assert_eq!(ips[0].recent_events.len(), 10);
        assert_eq!(ips[1].ip, "8.8.8.8");

        assert_eq!(log.flagged_events("9.9.9.9", 100).await.unwrap().len(), 12);
        assert!(log.flagged_events("8.8.8.8", 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flagged_bucket_outlives_main_log() {
        let log = InMemoryEventLog::default();
        log.log_event(&event("6.6.6.6", true, true, Duration::ZERO))
            .await
            .unwrap();

        log.clear_old_events(Duration::ZERO).await.unwrap();
        assert!(log.recent_events(10).await.unwrap().is_empty());
        assert_eq!(log.flagged_events("6.6.6.6", 10).await.unwrap().len(), 1);
    }
}
