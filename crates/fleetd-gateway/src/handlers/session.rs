//! Login and session teardown handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use fleetd_api::AuthContext;
use fleetd_auth::LoginRequest;

use crate::error::GatewayError;
use crate::state::GatewayState;

/// Header carrying the session id on authenticated calls.
pub const SESSION_HEADER: &str = "x-fleet-session";

/// The body of a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Session id to present in [`SESSION_HEADER`] on subsequent calls.
    pub session_id: Uuid,
    /// The authenticated entity's tag.
    pub tag: String,
}

/// `POST /v1/login`
///
/// Authenticates the presented tag + credential and opens an API
/// connection bound to the resolved entity's capabilities. Every
/// authentication failure is a uniform 401.
pub async fn login(
    State(state): State<GatewayState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, GatewayError> {
    let entity = fleetd_auth::authenticate(&state.authenticators, state.root.state(), &request)?;

    let context = AuthContext::for_entity(&entity);
    let tag = context.tag.to_string();
    let conn = Arc::new(state.root.connect(Arc::new(context)));
    let session_id = state.sessions.insert(conn);

    tracing::info!(tag = %tag, %session_id, "login");

    Ok(Json(LoginResponse { session_id, tag }))
}

/// `DELETE /v1/session`
///
/// Closes the caller's session; the connection's resources are released.
pub async fn logout(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<StatusCode, GatewayError> {
    let session_id = session_id_from(&headers)?;
    if !state.sessions.close(&session_id) {
        return Err(GatewayError::MissingSession);
    }
    tracing::info!(%session_id, "logout");
    Ok(StatusCode::NO_CONTENT)
}

/// Extract and parse the session header.
pub(crate) fn session_id_from(headers: &HeaderMap) -> Result<Uuid, GatewayError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or(GatewayError::MissingSession)
}
