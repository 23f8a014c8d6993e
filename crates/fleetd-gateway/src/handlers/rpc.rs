//! The RPC endpoint.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;
use crate::handlers::session::session_id_from;
use crate::state::GatewayState;

/// One RPC call: `(facade, version, object id, method, args)`.
#[derive(Debug, Deserialize)]
pub struct RpcCall {
    /// Facade name, e.g. `Agent`.
    pub facade: String,
    /// Facade version.
    pub version: u32,
    /// Legacy object id; must be empty.
    #[serde(default)]
    pub object_id: String,
    /// Method name, e.g. `SetStatus`.
    pub method: String,
    /// Method arguments.
    #[serde(default)]
    pub args: Value,
}

/// A successful RPC result.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// The method's return payload.
    pub response: Value,
}

/// `POST /v1/rpc`
///
/// Dispatches one call on the caller's authenticated session. Errors carry
/// a machine-readable code; `not_implemented` is how clients probe for
/// older controllers.
pub async fn rpc(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(call): Json<RpcCall>,
) -> Result<Json<RpcResponse>, GatewayError> {
    let session_id = session_id_from(&headers)?;
    let conn = state
        .sessions
        .get(&session_id)
        .ok_or(GatewayError::MissingSession)?;

    let response = conn.call(
        &call.facade,
        call.version,
        &call.object_id,
        &call.method,
        call.args,
    )?;

    Ok(Json(RpcResponse { response }))
}
