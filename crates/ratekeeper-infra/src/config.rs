//! Backend configuration loaded from environment variables.

use std::time::Duration;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Upper bound for a single store operation
    pub operation_timeout: Duration,
    /// Whether to fallback to the in-memory store if Redis is unavailable
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_millis(2000),
            fallback_to_memory: true,
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(env_parse("REDIS_CONNECT_TIMEOUT_SECS", 5)),
            operation_timeout: Duration::from_millis(env_parse("REDIS_OPERATION_TIMEOUT_MS", 2000)),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreMode {
    /// Per-process map. Not shared across instances.
    #[default]
    Memory,
    /// Shared Redis store.
    Redis,
}

impl StoreMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Some(StoreMode::Memory),
            "redis" => Some(StoreMode::Redis),
            _ => None,
        }
    }
}

/// Counter store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub mode: StoreMode,
    pub redis: RedisConfig,
    /// How often the in-memory store purges expired counters.
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: StoreMode::default(),
            redis: RedisConfig::default(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let mode = match std::env::var("RATE_LIMIT_STORE") {
            Ok(value) => StoreMode::parse(&value).unwrap_or_else(|| {
                tracing::warn!(value = %value, "Unknown RATE_LIMIT_STORE, using in-memory store");
                StoreMode::Memory
            }),
            Err(_) => StoreMode::Memory,
        };

        Self {
            mode,
            redis: RedisConfig::from_env(),
            sweep_interval: Duration::from_secs(env_parse("RATE_LIMIT_SWEEP_INTERVAL_SECS", 60)),
        }
    }
}

/// Event log retention configuration.
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// Maximum number of events kept.
    pub max_events: usize,
    /// Events older than this are evicted on write.
    pub retention: Duration,
    /// Retention of the per-IP buckets holding suspicious events.
    pub suspicious_retention: Duration,
    /// Key namespace in the shared store.
    pub key_prefix: String,
    /// Longest a check waits for its event to be recorded.
    pub write_timeout: Duration,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_events: 1000,
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            suspicious_retention: Duration::from_secs(30 * 24 * 60 * 60),
            key_prefix: "rl:log:".to_string(),
            write_timeout: Duration::from_millis(250),
        }
    }
}

impl EventLogConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_events: env_parse("RATE_LIMIT_EVENTS_MAX", defaults.max_events),
            retention: Duration::from_secs(
                env_parse("RATE_LIMIT_EVENTS_RETENTION_DAYS", 7u64) * 24 * 60 * 60,
            ),
            write_timeout: Duration::from_millis(env_parse(
                "RATE_LIMIT_EVENTS_WRITE_TIMEOUT_MS",
                250u64,
            )),
            ..defaults
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
