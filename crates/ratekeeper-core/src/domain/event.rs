use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{RateLimitResult, RequestMeta};

/// Number of recent events kept per IP in the suspicious view.
pub const SUSPICIOUS_SAMPLE_SIZE: usize = 10;

/// Attempts at this multiple of the limit mark a denied event as suspicious.
const SUSPICIOUS_MULTIPLIER: u64 = 2;

/// Record of one rate limit check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEvent {
    pub id: Uuid,
    pub ip: String,
    pub path: String,
    pub method: String,
    pub limiter_type: String,
    pub timestamp: DateTime<Utc>,
    pub exceeded: bool,
    pub suspicious: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl RateLimitEvent {
    /// Build the event for a completed check.
    pub fn from_result(meta: &RequestMeta, limiter_type: &str, result: &RateLimitResult) -> Self {
        let exceeded = !result.success;
        let suspicious =
            exceeded && result.count >= u64::from(result.limit) * SUSPICIOUS_MULTIPLIER;

        Self {
            id: Uuid::new_v4(),
            ip: meta.ip_or_unknown().to_string(),
            path: meta.path.clone(),
            method: meta.method.clone(),
            limiter_type: limiter_type.to_string(),
            timestamp: Utc::now(),
            exceeded,
            suspicious,
            remaining: Some(result.remaining),
            count: Some(result.count),
            limit: Some(result.limit),
            retry_after: result.retry_after,
            reset_time: Some(result.reset_time),
            user_id: meta.user_id.clone(),
        }
    }

    /// Whether the event counts towards the suspicious IP view.
    pub fn is_flagged(&self) -> bool {
        self.suspicious || self.exceeded
    }
}

/// Aggregated view of an IP with flagged events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousIp {
    pub ip: String,
    pub count: usize,
    /// Most recent first, at most [`SUSPICIOUS_SAMPLE_SIZE`] entries.
    pub recent_events: Vec<RateLimitEvent>,
}

impl SuspiciousIp {
    /// Group flagged events by IP and return the `limit` IPs with the most
    /// events. Ties are ordered by IP so the output is stable.
    pub fn rank<'a, I>(events: I, limit: usize) -> Vec<SuspiciousIp>
    where
        I: IntoIterator<Item = &'a RateLimitEvent>,
    {
        let mut by_ip: HashMap<&str, Vec<&RateLimitEvent>> = HashMap::new();
        for event in events.into_iter().filter(|e| e.is_flagged()) {
            by_ip.entry(event.ip.as_str()).or_default().push(event);
        }

        let mut ranked: Vec<SuspiciousIp> = by_ip
            .into_iter()
            .map(|(ip, mut events)| {
                events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                SuspiciousIp {
                    ip: ip.to_string(),
                    count: events.len(),
                    recent_events: events
                        .into_iter()
                        .take(SUSPICIOUS_SAMPLE_SIZE)
                        .cloned()
                        .collect(),
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ip: &str, exceeded: bool, age_secs: i64) -> RateLimitEvent {
        RateLimitEvent {
            id: Uuid::new_v4(),
            ip: ip.to_string(),
            path: "/api/bookings".to_string(),
            method: "POST".to_string(),
            limiter_type: "api".to_string(),
            timestamp: Utc::now() - chrono::Duration::seconds(age_secs),
            exceeded,
            suspicious: false,
            remaining: None,
            count: None,
            limit: None,
            retry_after: None,
            reset_time: None,
            user_id: None,
        }
    }

    #[test]
    fn test_rank_sorts_by_count_and_caps_sample() {
        let mut events = Vec::new();
        for i in 0..15 {
            events.push(event("10.0.0.1", true, i));
        }
        for i in 0..3 {
            events.push(event("10.0.0.2", true, i));
        }
        events.push(event("10.0.0.3", false, 0));

        let ranked = SuspiciousIp::rank(&events, 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].ip, "10.0.0.1");
        assert_eq!(ranked[0].count, 15);
        assert_eq!(ranked[0].recent_events.len(), SUSPICIOUS_SAMPLE_SIZE);
        assert!(
            ranked[0]
                .recent_events
                .windows(2)
                .all(|w| w[0].timestamp >= w[1].timestamp)
        );
        assert_eq!(ranked[1].count, 3);
        assert!(ranked[0].count > ranked[1].count);

        assert_eq!(SuspiciousIp::rank(&events, 1).len(), 1);
    }

    #[test]
    fn test_suspicious_after_double_limit() {
        let meta = RequestMeta::new(Some("1.2.3.4".into()), "/login", "POST");
        let mut result = RateLimitResult {
            success: false,
            limit: 5,
            remaining: 0,
            count: 6,
            reset_time: Utc::now(),
            retry_after: Some(10),
        };
        let first = RateLimitEvent::from_result(&meta, "auth", &result);
        assert!(first.exceeded);
        assert!(!first.suspicious);

        result.count = 10;
        let hammering = RateLimitEvent::from_result(&meta, "auth", &result);
        assert!(hammering.suspicious);
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let value = serde_json::to_value(event("1.1.1.1", true, 0)).unwrap();
        assert!(value.get("limiterType").is_some());
        assert!(value.get("remaining").is_none());
    }
}
