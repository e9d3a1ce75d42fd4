//! # Ratekeeper Shared
//!
//! Wire types shared between the server and its clients: rate limit
//! header names, GraphQL error payloads, admin API bodies and RFC 7807
//! problem details.

pub mod dto;
pub mod headers;
pub mod response;

pub use response::{ApiResponse, ErrorResponse};
