//! Application configuration loaded from environment variables.

use std::env;

use ratekeeper_core::domain::FailureMode;
use ratekeeper_infra::{EventLogConfig, StoreConfig};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitSettings,
}

/// Rate limiting configuration shared by every adapter.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub store: StoreConfig,
    pub events: EventLogConfig,
    /// Applied to every preset the server mounts.
    pub failure_mode: FailureMode,
    /// Cron expression of the event log trim job.
    pub trim_schedule: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            events: EventLogConfig::default(),
            failure_mode: FailureMode::Open,
            trim_schedule: "0 0 * * * *".to_string(),
        }
    }
}

impl RateLimitSettings {
    pub fn from_env() -> Self {
        let failure_mode = match env::var("RATE_LIMIT_FAILURE_MODE") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Invalid RATE_LIMIT_FAILURE_MODE, failing open");
                FailureMode::Open
            }),
            Err(_) => FailureMode::Open,
        };

        Self {
            store: StoreConfig::from_env(),
            events: EventLogConfig::from_env(),
            failure_mode,
            trim_schedule: env::var("RATE_LIMIT_TRIM_SCHEDULE")
                .unwrap_or_else(|_| "0 0 * * * *".to_string()),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            rate_limit: RateLimitSettings::from_env(),
        }
    }
}
