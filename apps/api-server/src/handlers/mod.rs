//! HTTP handlers and route configuration.

mod health;
mod rate_limits;

use actix_web::web;

use crate::middleware::RateLimitMiddleware;
use crate::state::AppState;

/// Configure all application routes.
///
/// The `api` policy covers the whole `/api` scope except health checks and
/// the admin area, which has its own `admin` policy.
pub fn configure_routes(cfg: &mut web::ServiceConfig, state: &AppState) {
    let limiter = state.rate_limiter.clone();

    cfg.service(
        web::scope("/api")
            .wrap(RateLimitMiddleware::new(
                limiter.clone(),
                state.policies.api.clone(),
            ))
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Admin routes
            .service(
                web::scope("/admin/rate-limits")
                    .wrap(RateLimitMiddleware::new(limiter, state.policies.admin.clone()))
                    .route("/events", web::get().to(rate_limits::recent_events))
                    .route("/events", web::delete().to(rate_limits::clear_old_events))
                    .route("/suspicious", web::get().to(rate_limits::suspicious_ips))
                    .route("/suspicious/{ip}", web::get().to(rate_limits::flagged_events)),
            ),
    );
}
