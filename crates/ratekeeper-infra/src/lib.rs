//! # Ratekeeper Infrastructure
//!
//! Concrete implementations of the ports defined in `ratekeeper-core`:
//! counter stores, event logs and the service adapters call into.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis counter store and event log

pub mod config;
pub mod events;
pub mod service;
pub mod store;

pub use config::{EventLogConfig, RedisConfig, StoreConfig, StoreMode};
pub use events::{InMemoryEventLog, connect_event_log};
pub use service::{RateLimitService, Verdict};
pub use store::{InMemoryCounterStore, StoreProvider, connect_counter_store};

#[cfg(feature = "redis")]
pub use events::RedisEventLog;
#[cfg(feature = "redis")]
pub use store::RedisCounterStore;
