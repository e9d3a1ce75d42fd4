//! # Ratekeeper API Server
//!
//! Actix-web server wiring the rate limiting adapters: HTTP middleware,
//! GraphQL operation guard, WebSocket guard and the admin endpoints.

pub mod config;
pub mod graphql;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod telemetry;

#[cfg(feature = "scheduler")]
pub mod background;

#[cfg(feature = "websocket")]
pub mod websocket;
