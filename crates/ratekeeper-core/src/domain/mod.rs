//! Domain entities - policies, check results and the event records they produce.

mod event;
mod policy;
mod request;
mod result;

pub use event::{RateLimitEvent, SUSPICIOUS_SAMPLE_SIZE, SuspiciousIp};
pub use policy::{FailureMode, IdentifierFn, RateLimitPolicy, RejectionMessage, SkipFn};
pub use request::{RequestMeta, UNKNOWN_IDENTIFIER};
pub use result::RateLimitResult;
