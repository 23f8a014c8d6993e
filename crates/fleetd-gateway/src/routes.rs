//! Router configuration.

use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, rpc, session};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /healthz` - Health check
/// - `POST /v1/login` - Authenticate and open a session
///
/// ## Authenticated (require the `x-fleet-session` header)
/// - `POST /v1/rpc` - Dispatch one facade call
/// - `DELETE /v1/session` - Close the session
#[must_use]
pub fn create_router(state: GatewayState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    Router::new()
        .route("/healthz", get(health::health))
        .route("/v1/login", post(session::login))
        .route("/v1/rpc", post(rpc::rpc))
        .route("/v1/session", delete(session::logout))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}
