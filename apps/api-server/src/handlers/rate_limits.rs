//! Admin endpoints over the rate limit event log.

use std::net::IpAddr;
use std::time::Duration;

use actix_web::{HttpResponse, web};

use ratekeeper_core::domain::UNKNOWN_IDENTIFIER;
use ratekeeper_shared::ApiResponse;
use ratekeeper_shared::dto::{ClearEventsQuery, ClearEventsResponse, LimitQuery};

use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /api/admin/rate-limits/events
pub async fn recent_events(
    state: web::Data<AppState>,
    query: web::Query<LimitQuery>,
) -> AppResult<HttpResponse> {
    let events = state.events().recent_events(query.resolved()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(events)))
}

/// GET /api/admin/rate-limits/suspicious
pub async fn suspicious_ips(
    state: web::Data<AppState>,
    query: web::Query<LimitQuery>,
) -> AppResult<HttpResponse> {
    let ips = state.events().suspicious_ips(query.resolved()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(ips)))
}

/// GET /api/admin/rate-limits/suspicious/{ip}
pub async fn flagged_events(
    state: web::Data<AppState>,
    ip: web::Path<String>,
    query: web::Query<LimitQuery>,
) -> AppResult<HttpResponse> {
    let ip = ip.into_inner();
    if ip != UNKNOWN_IDENTIFIER && ip.parse::<IpAddr>().is_err() {
        return Err(AppError::BadRequest(format!("Invalid IP address: {}", ip)));
    }

    let events = state.events().flagged_events(&ip, query.resolved()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(events)))
}

/// DELETE /api/admin/rate-limits/events
pub async fn clear_old_events(
    state: web::Data<AppState>,
    query: web::Query<ClearEventsQuery>,
) -> AppResult<HttpResponse> {
    let removed = state
        .events()
        .clear_old_events(Duration::from_secs(query.older_than_secs))
        .await?;

    tracing::info!(removed, older_than_secs = query.older_than_secs, "Cleared rate limit events");

    Ok(HttpResponse::Ok().json(ApiResponse::ok_with_message(
        ClearEventsResponse { removed },
        format!("Removed {} events", removed),
    )))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test, web};
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    use ratekeeper_core::domain::{RateLimitEvent, RateLimitPolicy, RateLimitResult, RequestMeta};

    use ratekeeper_infra::{InMemoryCounterStore, InMemoryEventLog, RateLimitService};

    use crate::handlers::configure_routes;
    use crate::state::{AppState, RoutePolicies};

    fn state() -> AppState {
        AppState::from_parts(
            Arc::new(RateLimitService::new(
                Arc::new(InMemoryCounterStore::new()),
                Arc::new(InMemoryEventLog::default()),
            )),
            RoutePolicies::default(),
        )
    }

    macro_rules! app {
        ($state:expr) => {{
            let state = $state;
            test::init_service(
                App::new()
                    .app_data(web::Data::new(state.clone()))
                    .configure(|cfg| configure_routes(cfg, &state)),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn test_health_is_not_rate_limited() {
        let app = app!(state());

        for _ in 0..3 {
            let req = test::TestRequest::get().uri("/api/health").to_request();
            let res = test::call_service(&app, req).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().get("X-RateLimit-Limit").is_none());
        }
    }

    #[actix_web::test]
    async fn test_admin_routes_use_admin_policy() {
        let app = app!(state());

        let req = test::TestRequest::get()
            .uri("/api/admin/rate-limits/events?limit=5")
            .insert_header(("X-Forwarded-For", "10.0.0.1"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("X-RateLimit-Limit").unwrap(), "50");
        assert_eq!(res.headers().get("X-RateLimit-Remaining").unwrap(), "49");

        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["success"], true);
        // The admin check itself was recorded
        let events = body["data"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["limiterType"], "admin");
        assert_eq!(events[0]["ip"], "10.0.0.1");
    }

    #[actix_web::test]
    async fn test_suspicious_and_flagged_views() {
        let state = state();
        let policy = RateLimitPolicy::new("financial", Duration::from_secs(60), 1).unwrap();
        let meta = RequestMeta::new(Some("6.6.6.6".to_string()), "/api/payments", "POST");
        for _ in 0..4 {
            state.rate_limiter.check(&policy, &meta).await;
        }
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/api/admin/rate-limits/suspicious")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let ips = body["data"].as_array().unwrap();
        assert_eq!(ips[0]["ip"], "6.6.6.6");
        assert_eq!(ips[0]["count"], 3);

        let req = test::TestRequest::get()
            .uri("/api/admin/rate-limits/suspicious/6.6.6.6?limit=1")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let flagged = body["data"].as_array().unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0]["suspicious"], true);

        let req = test::TestRequest::get()
            .uri("/api/admin/rate-limits/suspicious/not-an-ip")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_clear_old_events() {
        let state = state();
        let meta = RequestMeta::new(Some("7.7.7.7".to_string()), "/api/items", "GET");
        let result = RateLimitResult {
            success: true,
            limit: 100,
            remaining: 99,
            count: 1,
            reset_time: Utc::now(),
            retry_after: None,
        };
        let mut stale = RateLimitEvent::from_result(&meta, "api", &result);
        stale.timestamp = Utc::now() - chrono::Duration::hours(2);
        state.events().log_event(&stale).await.unwrap();
        let app = app!(state);

        let req = test::TestRequest::delete()
            .uri("/api/admin/rate-limits/events?older_than_secs=3600")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["removed"], 1);
        assert_eq!(body["message"], "Removed 1 events");

        let req = test::TestRequest::delete()
            .uri("/api/admin/rate-limits/events")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
