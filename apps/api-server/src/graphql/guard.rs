use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, http::StatusCode};
use thiserror::Error;

use ratekeeper_core::domain::{RateLimitPolicy, RateLimitResult, RequestMeta, UNKNOWN_IDENTIFIER};
use ratekeeper_infra::{RateLimitService, Verdict};
use ratekeeper_shared::dto::{GraphQlError, GraphQlErrorResponse};

use crate::graphql::GraphQlOperation;
use crate::middleware::client_ip;
use crate::middleware::rate_limit::limit_headers;

/// Denial raised by [`GraphQlRateLimiter::guard`].
#[derive(Debug, Clone, Error)]
#[error("{}", .0.message)]
pub struct GraphQlRateLimitError(GraphQlError);

impl GraphQlRateLimitError {
    fn new(policy: &RateLimitPolicy, result: &RateLimitResult) -> Self {
        Self(GraphQlError::rate_limited(
            policy.message().summary(),
            policy.status_code(),
            &limit_headers(result),
        ))
    }

    /// The entry to place in the response's `errors` array.
    pub fn graphql_error(&self) -> &GraphQlError {
        &self.0
    }

    /// Response for GraphQL served over HTTP: the error's status and
    /// headers with an errors-only body.
    pub fn to_http_response(&self) -> HttpResponse {
        let http = &self.0.extensions.http;
        let status = StatusCode::from_u16(http.status).unwrap_or(StatusCode::TOO_MANY_REQUESTS);

        let mut builder = HttpResponse::build(status);
        for (name, value) in &http.headers {
            builder.insert_header((name.as_str(), value.as_str()));
        }
        builder.json(GraphQlErrorResponse::from(self.0.clone()))
    }
}

/// Rate limits GraphQL operations per root field and client IP.
pub struct GraphQlRateLimiter {
    limiter: Arc<RateLimitService>,
    policy: Arc<RateLimitPolicy>,
}

impl GraphQlRateLimiter {
    pub fn new(limiter: Arc<RateLimitService>, policy: Arc<RateLimitPolicy>) -> Self {
        Self { limiter, policy }
    }

    /// Count `operation` for `ip`.
    ///
    /// Introspection-only operations are never counted. `Ok(None)` means the
    /// operation proceeds without a counted result (skipped or failed open).
    pub async fn guard(
        &self,
        operation: &GraphQlOperation,
        ip: Option<&str>,
    ) -> Result<Option<RateLimitResult>, GraphQlRateLimitError> {
        if operation.is_introspection() {
            return Ok(None);
        }

        let field = operation.field_name();
        let meta = RequestMeta::new(
            ip.map(str::to_string),
            format!("graphql:{}", field),
            operation.operation_type.to_string(),
        );
        if self.policy.should_skip(&meta) {
            return Ok(None);
        }

        let identifier = format!("graphql:{}:{}", field, ip.unwrap_or(UNKNOWN_IDENTIFIER));
        match self
            .limiter
            .check_identifier(&self.policy, &identifier, &meta)
            .await
        {
            Verdict::Denied(result) => {
                tracing::warn!(
                    identifier = %identifier,
                    operation = ?operation.name,
                    "GraphQL rate limit exceeded"
                );
                Err(GraphQlRateLimitError::new(&self.policy, &result))
            }
            verdict => Ok(verdict.result().cloned()),
        }
    }

    /// Guard a GraphQL-over-HTTP request carrying `query`.
    ///
    /// Documents without an operation are left to the executor to reject.
    pub async fn guard_request(
        &self,
        req: &HttpRequest,
        query: &str,
    ) -> Result<Option<RateLimitResult>, GraphQlRateLimitError> {
        match GraphQlOperation::from_query(query) {
            Some(operation) => self.guard(&operation, client_ip(req).as_deref()).await,
            None => Ok(None),
        }
    }
}
