//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The presented identity string is malformed, or its kind has no
    /// registered authenticator.
    #[error("\"{0}\" is not a valid tag")]
    InvalidTag(String),

    /// Credential verification failed.
    ///
    /// Deliberately uniform across causes (unknown entity, wrong password,
    /// wrong nonce, dead agent) so callers cannot enumerate entities.
    #[error("invalid entity name or password")]
    InvalidCredentials,

    /// The state layer failed for a reason other than a missing entity.
    #[error("state error: {0}")]
    State(#[from] fleetd_state::StateError),
}

impl AuthError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidTag(_) => 400,
            Self::InvalidCredentials => 401,
            Self::State(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::State(_))
    }
}
