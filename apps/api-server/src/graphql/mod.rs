//! GraphQL operation guard.
//!
//! Protocol-level: the guard runs before an executor resolves an
//! operation and reports denials as GraphQL errors.

mod guard;
mod operation;

pub use guard::{GraphQlRateLimitError, GraphQlRateLimiter};
pub use operation::{GraphQlOperation, INTROSPECTION_FIELDS, OperationType};
