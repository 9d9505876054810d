//! Thin web layer: REST routes over the supervisor and store, plus the
//! WebSocket hub that fans realtime events out to subscribers.

pub mod config;
pub mod error;
pub mod hub;
pub mod media_routes;
pub mod routes;
pub mod server;
pub mod ws;

pub use {
    config::GatewayConfig,
    error::{ApiError, ApiResult},
    hub::RealtimeHub,
    server::{AppState, router, serve},
};
