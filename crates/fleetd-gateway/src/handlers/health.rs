//! Health check handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` when the gateway is serving.
    pub status: &'static str,
    /// Number of live authenticated sessions.
    pub sessions: usize,
}

/// `GET /healthz`
pub async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.sessions.count(),
    })
}
