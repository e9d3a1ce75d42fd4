//! Middleware modules.

pub mod error;
pub mod rate_limit;

pub use rate_limit::{RateLimitMiddleware, check_request, client_ip, resolve_client_ip};
