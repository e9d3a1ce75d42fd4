//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod counter_store;
mod event_log;

pub use counter_store::{CounterStore, WindowHit};
pub use event_log::EventLog;
