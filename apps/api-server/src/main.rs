//! # Ratekeeper API Server
//!
//! The main entry point for the Actix-web HTTP server.

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

use api_server::config::AppConfig;
use api_server::handlers;
use api_server::state::AppState;
use api_server::telemetry::{TelemetryConfig, init_telemetry};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_telemetry(&TelemetryConfig::from_env());

    // Load configuration
    let config = AppConfig::from_env();

    tracing::info!(
        "Starting Ratekeeper API Server on {}:{}",
        config.host,
        config.port
    );

    // Build application state
    let state = AppState::new(&config.rate_limit)
        .await
        .context("failed to initialize rate limit backends")?;

    #[cfg(feature = "scheduler")]
    let scheduler = start_scheduler(&config, &state).await?;

    // Socket.IO rides on a tower stack; actix only hosts the HTTP routes.
    #[cfg(feature = "websocket")]
    let (_socket_layer, _io) = websocket_layer(&state)?;

    // Start HTTP server
    let server_state = state.clone();
    // Shared with GraphQL executors mounted on the app
    let graphql_guard = web::Data::new(state.graphql_guard());
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(server_state.clone()))
            .app_data(graphql_guard.clone())
            .configure(|cfg| handlers::configure_routes(cfg, &server_state))
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    #[cfg(feature = "scheduler")]
    {
        let mut scheduler = scheduler;
        scheduler.shutdown().await?;
    }

    Ok(())
}

#[cfg(feature = "scheduler")]
async fn start_scheduler(
    config: &AppConfig,
    state: &AppState,
) -> anyhow::Result<api_server::background::Scheduler> {
    use api_server::background::{Scheduler, SchedulerConfig};

    let scheduler = Scheduler::new(SchedulerConfig::from_env()).await?;
    scheduler
        .add_event_trim(
            &config.rate_limit.trim_schedule,
            state.events().clone(),
            config.rate_limit.events.retention,
        )
        .await?;
    scheduler.start().await?;
    Ok(scheduler)
}

#[cfg(feature = "websocket")]
fn websocket_layer(
    state: &AppState,
) -> anyhow::Result<(socketioxide::layer::SocketIoLayer, socketioxide::SocketIo)> {
    use api_server::websocket::{WsLimits, WsRateLimiter, WsState, create_socketio_layer};
    use std::sync::Arc;

    let limits = WsLimits::from_env();
    tracing::info!(
        max_message_bytes = limits.max_message_bytes,
        messages_per_second = limits.messages_per_second,
        "WebSocket rate limiter configured"
    );
    let rate_limiter = WsRateLimiter::new(
        state.rate_limiter.clone(),
        state.policies.websocket.clone(),
        limits,
    );

    Ok(create_socketio_layer(WsState {
        rate_limiter: Arc::new(rate_limiter),
    }))
}
