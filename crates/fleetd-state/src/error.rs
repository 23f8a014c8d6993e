//! Error types for the state layer.

use thiserror::Error;

use crate::txn::TxnError;

/// A result type using `StateError`.
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur in state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// The named entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// No status record exists for the given global key.
    #[error("status for {0} not found")]
    StatusNotFound(String),

    /// The entity exists but is dead, or was removed mid-operation.
    #[error("{0} not found or dead")]
    DeadOrGone(String),

    /// An entity with the same identity already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// A name or argument failed validation; the message is complete.
    #[error("{0}")]
    NotValid(String),

    /// The machine already carries a provisioning nonce.
    #[error("machine {0} already provisioned")]
    AlreadyProvisioned(String),

    /// A transaction-level failure.
    #[error(transparent)]
    Txn(#[from] TxnError),

    /// Serialization or deserialization of a document failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An operation failed; the action names the entity and operation.
    #[error("cannot {action}: {cause}")]
    Failed {
        /// What was being attempted, e.g. `set status of unit agent "mysql/0"`.
        action: String,
        /// The underlying failure.
        #[source]
        cause: Box<StateError>,
    },
}

impl StateError {
    /// Wrap this error with operation context.
    #[must_use]
    pub fn annotate(self, action: impl Into<String>) -> Self {
        Self::Failed {
            action: action.into(),
            cause: Box::new(self),
        }
    }

    /// True if the root cause is an optimistic-concurrency conflict, the
    /// only condition a caller may legitimately retry.
    #[must_use]
    pub fn is_contention(&self) -> bool {
        match self {
            Self::Txn(TxnError::Contention) => true,
            Self::Failed { cause, .. } => cause.is_contention(),
            _ => false,
        }
    }

    /// True if the root cause is a missing entity or status record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::StatusNotFound(_) | Self::DeadOrGone(_) => true,
            Self::Failed { cause, .. } => cause.is_not_found(),
            _ => false,
        }
    }
}
