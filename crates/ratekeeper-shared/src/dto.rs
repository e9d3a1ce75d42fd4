//! Data Transfer Objects - request/response types for the API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::headers;

/// `?limit=` query of the admin listing endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 1000;

    /// Requested limit, defaulted and clamped to `1..=MAX_LIMIT`.
    pub fn resolved(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// Query of `DELETE /api/admin/rate-limits/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearEventsQuery {
    pub older_than_secs: u64,
}

/// Response of `DELETE /api/admin/rate-limits/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearEventsResponse {
    pub removed: usize,
}

/// The four rate limit headers, as reported inside GraphQL errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    pub reset: i64,
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    /// Header name/value pairs, `Retry-After` only when set.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (headers::X_RATELIMIT_LIMIT, self.limit.to_string()),
            (headers::X_RATELIMIT_REMAINING, self.remaining.to_string()),
            (headers::X_RATELIMIT_RESET, self.reset.to_string()),
        ];
        if let Some(retry_after) = self.retry_after {
            pairs.push((headers::RETRY_AFTER, retry_after.to_string()));
        }
        pairs
    }
}

/// HTTP sub-payload for transports tunnelling GraphQL over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlHttpExtension {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlErrorExtensions {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub http: GraphQlHttpExtension,
}

/// A GraphQL error entry, as placed in a response's `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    pub extensions: GraphQlErrorExtensions,
}

impl GraphQlError {
    pub const RATE_LIMITED: &'static str = "RATE_LIMITED";

    pub fn rate_limited(message: impl Into<String>, status: u16, limits: &RateLimitHeaders) -> Self {
        let headers = limits
            .to_pairs()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        Self {
            message: message.into(),
            extensions: GraphQlErrorExtensions {
                code: Self::RATE_LIMITED.to_string(),
                retry_after: limits.retry_after,
                http: GraphQlHttpExtension { status, headers },
            },
        }
    }
}

/// Body of a GraphQL response that carries only errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQlErrorResponse {
    pub data: Option<serde_json::Value>,
    pub errors: Vec<GraphQlError>,
}

impl From<GraphQlError> for GraphQlErrorResponse {
    fn from(error: GraphQlError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_limit_query_is_clamped() {
        assert_eq!(LimitQuery::default().resolved(), 100);
        assert_eq!(LimitQuery { limit: Some(0) }.resolved(), 1);
        assert_eq!(LimitQuery { limit: Some(50_000) }.resolved(), 1000);
    }

    #[test]
    fn test_graphql_error_shape() {
        let limits = RateLimitHeaders {
            limit: 60,
            remaining: 0,
            reset: 1_700_000_060,
            retry_after: Some(42),
        };
        let error = GraphQlError::rate_limited("Too many GraphQL requests", 429, &limits);

        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({
                "message": "Too many GraphQL requests",
                "extensions": {
                    "code": "RATE_LIMITED",
                    "retryAfter": 42,
                    "http": {
                        "status": 429,
                        "headers": {
                            "Retry-After": "42",
                            "X-RateLimit-Limit": "60",
                            "X-RateLimit-Remaining": "0",
                            "X-RateLimit-Reset": "1700000060"
                        }
                    }
                }
            })
        );
    }
}
