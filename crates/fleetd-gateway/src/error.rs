//! Gateway error responses.
//!
//! Every error leaves the gateway as `{error: {code, message}}` with the
//! HTTP status implied by the code. Clients branch on the code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use fleetd_api::ApiError;
use fleetd_auth::AuthError;

/// Errors a gateway handler can fail with.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The session header is missing, malformed, or names no live session.
    #[error("unauthorized")]
    MissingSession,

    /// An API-layer failure; carries its own code.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        Self::Api(err.into())
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl GatewayError {
    /// The machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingSession => "unauthorized",
            Self::Api(err) => err.code(),
        }
    }

    /// The HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        let code = match self {
            Self::MissingSession => 401,
            Self::Api(err) => err.http_status_code(),
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_session_is_unauthorized() {
        let err = GatewayError::MissingSession;
        assert_eq!(err.code(), "unauthorized");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn api_errors_keep_their_codes() {
        let err = GatewayError::from(ApiError::NotFound("facade \"Ghost\" version 1".into()));
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = GatewayError::from(ApiError::NotImplemented("method \"X\"".into()));
        assert_eq!(err.status_code(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn auth_errors_become_api_errors() {
        let err = GatewayError::from(AuthError::InvalidCredentials);
        assert_eq!(err.code(), "unauthorized");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
