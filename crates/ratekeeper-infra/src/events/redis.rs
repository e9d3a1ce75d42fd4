//! Redis event log using sorted sets scored by timestamp.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};

use ratekeeper_core::EventLogError;
use ratekeeper_core::domain::{RateLimitEvent, SuspiciousIp};
use ratekeeper_core::ports::EventLog;

use crate::config::{EventLogConfig, RedisConfig};
use crate::store::redis::connect;

/// Redis-backed event log.
///
/// Events live in `{prefix}events` as JSON members scored by timestamp
/// millis; suspicious events are copied to `{prefix}suspicious:{ip}`.
/// Every command is bounded by the Redis `operation_timeout`.
pub struct RedisEventLog {
    conn: ConnectionManager,
    config: EventLogConfig,
    operation_timeout: Duration,
}

impl RedisEventLog {
    pub async fn new(redis: &RedisConfig, config: EventLogConfig) -> Result<Self, EventLogError> {
        let conn = connect(redis)
            .await
            .map_err(|e| EventLogError::Backend(e.to_string()))?;

        tracing::info!(url = %redis.url, prefix = %config.key_prefix, "Connected to Redis event log");

        Ok(Self {
            conn,
            config,
            operation_timeout: redis.operation_timeout,
        })
    }

    async fn run<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T, EventLogError> {
        tokio::time::timeout(self.operation_timeout, op)
            .await
            .map_err(|_| {
                EventLogError::Backend(format!(
                    "Redis operation timed out after {:?}",
                    self.operation_timeout
                ))
            })?
            .map_err(backend)
    }

    fn events_key(&self) -> String {
        format!("{}events", self.config.key_prefix)
    }

    fn flagged_key(&self, ip: &str) -> String {
        format!("{}suspicious:{}", self.config.key_prefix, ip)
    }

    fn cutoff_millis(age: Duration) -> i64 {
        let age = i64::try_from(age.as_millis()).unwrap_or(i64::MAX);
        Utc::now().timestamp_millis().saturating_sub(age)
    }

    fn decode(members: Vec<String>) -> Vec<RateLimitEvent> {
        members
            .into_iter()
            .filter_map(|raw| match serde_json::from_str(&raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable rate limit event");
                    None
                }
            })
            .collect()
    }

    async fn newest(&self, key: &str, limit: usize) -> Result<Vec<RateLimitEvent>, EventLogError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = isize::try_from(limit).unwrap_or(isize::MAX) - 1;
        let members: Vec<String> = self.run(conn.zrevrange(key, 0, stop)).await?;
        Ok(Self::decode(members))
    }
}

fn backend(e: redis::RedisError) -> EventLogError {
    EventLogError::Backend(e.to_string())
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn log_event(&self, event: &RateLimitEvent) -> Result<(), EventLogError> {
        let member = serde_json::to_string(event)?;
        let score = event.timestamp.timestamp_millis();
        let key = self.events_key();
        let keep = isize::try_from(self.config.max_events).unwrap_or(isize::MAX);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zadd(&key, &member, score)
            .ignore()
            .zrembyscore(&key, "-inf", Self::cutoff_millis(self.config.retention))
            .ignore()
            .zremrangebyrank(&key, 0, -(keep + 1))
            .ignore();

        if event.exceeded && event.suspicious {
            let flagged = self.flagged_key(&event.ip);
            let ttl = i64::try_from(self.config.suspicious_retention.as_secs()).unwrap_or(i64::MAX);
            pipe.zadd(&flagged, &member, score)
                .ignore()
                .zrembyscore(
                    &flagged,
                    "-inf",
                    Self::cutoff_millis(self.config.suspicious_retention),
                )
                .ignore()
                .expire(&flagged, ttl)
                .ignore();
        }

        let mut conn = self.conn.clone();
        let (): () = self.run(pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<RateLimitEvent>, EventLogError> {
        self.newest(&self.events_key(), limit).await
    }

    async fn suspicious_ips(&self, limit: usize) -> Result<Vec<SuspiciousIp>, EventLogError> {
        let events = self.newest(&self.events_key(), self.config.max_events).await?;
        Ok(SuspiciousIp::rank(&events, limit))
    }

    async fn flagged_events(
        &self,
        ip: &str,
        limit: usize,
    ) -> Result<Vec<RateLimitEvent>, EventLogError> {
        self.newest(&self.flagged_key(ip), limit).await
    }

    async fn clear_old_events(&self, older_than: Duration) -> Result<usize, EventLogError> {
        let mut conn = self.conn.clone();
        self.run(conn.zrembyscore(self.events_key(), "-inf", Self::cutoff_millis(older_than)))
            .await
    }
}
