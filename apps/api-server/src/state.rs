//! Application state - shared across all handlers.

use std::sync::Arc;

use ratekeeper_core::Preset;
use ratekeeper_core::domain::{FailureMode, RateLimitPolicy, RequestMeta};
use ratekeeper_core::ports::EventLog;
use ratekeeper_infra::{RateLimitService, connect_counter_store, connect_event_log};

use crate::config::RateLimitSettings;
use crate::graphql::GraphQlRateLimiter;

/// Policies mounted by the server.
#[derive(Debug, Clone)]
pub struct RoutePolicies {
    pub api: Arc<RateLimitPolicy>,
    pub admin: Arc<RateLimitPolicy>,
    pub graphql: Arc<RateLimitPolicy>,
    pub websocket: Arc<RateLimitPolicy>,
}

impl RoutePolicies {
    pub fn new(failure_mode: FailureMode) -> Self {
        let api = Preset::Api
            .policy()
            .with_failure_mode(failure_mode)
            .with_skip(|meta: &RequestMeta| {
                meta.path == "/api/health" || meta.path.starts_with("/api/admin")
            });

        Self {
            api: Arc::new(api),
            admin: Arc::new(Preset::Admin.policy().with_failure_mode(failure_mode)),
            graphql: Arc::new(Preset::Graphql.policy().with_failure_mode(failure_mode)),
            websocket: Arc::new(Preset::Websocket.policy().with_failure_mode(failure_mode)),
        }
    }
}

impl Default for RoutePolicies {
    fn default() -> Self {
        Self::new(FailureMode::Open)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimitService>,
    pub policies: RoutePolicies,
}

impl AppState {
    /// Connect the configured backends and build the state.
    ///
    /// Fails only when Redis is unreachable and fallback is disabled.
    pub async fn new(settings: &RateLimitSettings) -> anyhow::Result<Self> {
        let store = connect_counter_store(&settings.store).await?;
        let events = connect_event_log(&settings.store, settings.events.clone()).await?;

        tracing::info!(
            store = ?settings.store.mode,
            failure_mode = ?settings.failure_mode,
            "Application state initialized"
        );

        Ok(Self::from_parts(
            Arc::new(
                RateLimitService::new(store, events)
                    .with_event_timeout(settings.events.write_timeout),
            ),
            RoutePolicies::new(settings.failure_mode),
        ))
    }

    pub fn from_parts(rate_limiter: Arc<RateLimitService>, policies: RoutePolicies) -> Self {
        Self {
            rate_limiter,
            policies,
        }
    }

    /// Guard for GraphQL executors, counted under the `graphql` policy.
    pub fn graphql_guard(&self) -> GraphQlRateLimiter {
        GraphQlRateLimiter::new(self.rate_limiter.clone(), self.policies.graphql.clone())
    }

    pub fn events(&self) -> &Arc<dyn EventLog> {
        self.rate_limiter.events()
    }
}
