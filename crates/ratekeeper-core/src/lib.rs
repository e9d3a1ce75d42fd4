//! # Ratekeeper Core
//!
//! The domain layer of the rate limiting facility.
//! This crate contains policies, the fixed-window decision logic and the
//! ports storage backends implement. It has zero infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod limiter;
pub mod ports;
pub mod presets;

#[cfg(test)]
mod testing;

pub use error::{EventLogError, PolicyError, StoreError};
pub use limiter::FixedWindowLimiter;
pub use presets::{PolicyOverrides, Preset, create_from_preset};
