//! API error taxonomy.
//!
//! Every error crossing the RPC surface carries a machine-readable code
//! plus a human message. Callers branch on the code, never the message;
//! the one documented exception is version probing via `not_implemented`.

use thiserror::Error;

use fleetd_auth::AuthError;
use fleetd_state::StateError;

/// A result type using `ApiError`.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication is missing or failed.
    #[error("unauthorized")]
    Unauthorized,

    /// A capability gate failed.
    #[error("permission denied")]
    PermissionDenied,

    /// No such entity, status record, or facade version.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unknown method or facade capability; also how clients probe for
    /// older controllers.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Malformed request, including invalid tags.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The backend lacks an optional capability.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The target entity is no longer in an updatable state. Terminal.
    #[error("{0}")]
    Dead(String),

    /// An optimistic-concurrency conflict survived the server's retries.
    /// The only code a caller may legitimately retry.
    #[error("{0}")]
    Contention(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::NotImplemented(_) => "not_implemented",
            Self::BadRequest(_) => "bad_request",
            Self::NotSupported(_) => "not_supported",
            Self::Dead(_) => "dead",
            Self::Contention(_) => "contention",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::PermissionDenied => 403,
            Self::NotFound(_) => 404,
            Self::NotImplemented(_) => 501,
            Self::BadRequest(_) | Self::NotSupported(_) => 400,
            Self::Dead(_) => 410,
            Self::Contention(_) => 409,
            Self::Internal(_) => 500,
        }
    }
}

impl From<StateError> for ApiError {
    fn from(err: StateError) -> Self {
        let message = err.to_string();
        if err.is_contention() {
            Self::Contention(message)
        } else if err.is_not_found() {
            if root_is_dead(&err) {
                Self::Dead(message)
            } else {
                Self::NotFound(message)
            }
        } else {
            tracing::error!(error = %err, "state error");
            Self::Internal(message)
        }
    }
}

fn root_is_dead(err: &StateError) -> bool {
    match err {
        StateError::DeadOrGone(_) => true,
        StateError::Failed { cause, .. } => root_is_dead(cause),
        _ => false,
    }
}

impl From<fleetd_provider::ProviderError> for ApiError {
    fn from(err: fleetd_provider::ProviderError) -> Self {
        use fleetd_provider::ProviderError;
        match err {
            ProviderError::NotSupported(what) => Self::NotSupported(what.to_string()),
            ProviderError::NoneMatch => {
                Self::NotFound("instance types matching constraint".to_string())
            }
            ProviderError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidTag(_) => Self::BadRequest(err.to_string()),
            AuthError::InvalidCredentials => Self::Unauthorized,
            AuthError::State(e) => {
                tracing::error!(error = %e, "auth state error");
                Self::Internal("authentication backend error".to_string())
            }
        }
    }
}
