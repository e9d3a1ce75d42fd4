//! Rate limiting middleware.
//!
//! Two styles over the same [`RateLimitService`]: the [`RateLimitMiddleware`]
//! transform for whole scopes, and [`check_request`] for handlers that check
//! a single request themselves.

use std::future::{Ready, ready};
use std::net::IpAddr;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpRequest, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::{
        StatusCode,
        header::{HeaderMap, HeaderName, HeaderValue},
    },
};
use futures::future::LocalBoxFuture;

use ratekeeper_core::domain::{RateLimitPolicy, RateLimitResult, RequestMeta};
use ratekeeper_infra::{RateLimitService, Verdict};
use ratekeeper_shared::dto::RateLimitHeaders;

/// Client IP: first `X-Forwarded-For` entry, then `X-Real-IP`, then
/// `CF-Connecting-IP`, then the peer address.
///
/// `header` looks a header up by name, so any transport's header map works.
pub fn resolve_client_ip<'a>(
    header: impl Fn(&str) -> Option<&'a str>,
    peer: Option<IpAddr>,
) -> Option<String> {
    let header = |name: &str| header(name).map(str::trim).filter(|value| !value.is_empty());

    header("X-Forwarded-For")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header("X-Real-IP"))
        .or_else(|| header("CF-Connecting-IP"))
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
}

pub fn client_ip(req: &HttpRequest) -> Option<String> {
    resolve_client_ip(
        |name| req.headers().get(name).and_then(|value| value.to_str().ok()),
        req.peer_addr().map(|addr| addr.ip()),
    )
}

pub fn request_meta(req: &HttpRequest) -> RequestMeta {
    RequestMeta::new(client_ip(req), req.path(), req.method().as_str())
}

pub fn limit_headers(result: &RateLimitResult) -> RateLimitHeaders {
    RateLimitHeaders {
        limit: result.limit,
        remaining: result.remaining,
        reset: result.reset_unix_secs(),
        retry_after: result.retry_after,
    }
}

fn apply_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    for (name, value) in limit_headers(result).to_pairs() {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            headers.insert(name, value);
        }
    }
}

/// Denial response: the policy's status and message plus the limit headers.
pub fn rejection_response(policy: &RateLimitPolicy, result: &RateLimitResult) -> HttpResponse {
    let status =
        StatusCode::from_u16(policy.status_code()).unwrap_or(StatusCode::TOO_MANY_REQUESTS);

    let mut builder = HttpResponse::build(status);
    for header in limit_headers(result).to_pairs() {
        builder.insert_header(header);
    }
    builder.json(policy.message().to_body())
}

/// Check a single request. `None` means proceed.
pub async fn check_request(
    req: &HttpRequest,
    limiter: &RateLimitService,
    policy: &RateLimitPolicy,
) -> Option<HttpResponse> {
    match limiter.check(policy, &request_meta(req)).await {
        Verdict::Denied(result) => Some(rejection_response(policy, &result)),
        Verdict::Allowed(_) | Verdict::Skipped | Verdict::FailedOpen => None,
    }
}

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimitService>,
    policy: Arc<RateLimitPolicy>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimitService>, policy: Arc<RateLimitPolicy>) -> Self {
        Self { limiter, policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            policy: self.policy.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimitService>,
    policy: Arc<RateLimitPolicy>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let policy = self.policy.clone();

        Box::pin(async move {
            let meta = request_meta(req.request());
            let verdict = limiter.check(&policy, &meta).await;

            if let Verdict::Denied(result) = &verdict {
                tracing::warn!(
                    ip = %meta.ip_or_unknown(),
                    path = %meta.path,
                    policy = %policy.name(),
                    "Rate limit exceeded"
                );
                let response = rejection_response(&policy, result);
                return Ok(req.into_response(response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            if let Some(result) = verdict.result() {
                apply_headers(res.headers_mut(), result);
            }
            Ok(res.map_into_left_body())
        })
    }
}
