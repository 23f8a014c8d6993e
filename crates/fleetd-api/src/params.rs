//! Wire parameter types for the RPC surface.
//!
//! Bulk calls are position-correlated: a result list always has the same
//! length and order as its argument list, and a failure in one slot never
//! disturbs its siblings.

use serde::{Deserialize, Serialize};

use fleetd_provider::{CapacityConstraint, InstanceType};
use fleetd_state::{Status, StatusData};

use crate::error::ApiError;

pub use fleetd_auth::LoginRequest;

/// The result of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResult {
    /// The authenticated entity's tag.
    pub tag: String,
}

/// A single entity reference in a bulk call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// The entity's tag string.
    pub tag: String,
}

/// A bulk list of entity references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entities {
    /// The referenced entities, in caller order.
    pub entities: Vec<Entity>,
}

/// A machine-readable error carried inside a result slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable error code; callers branch on this.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&ApiError> for ErrorPayload {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// One slot of a bulk operation that returns no payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResult {
    /// The failure, if the slot failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ErrorResult {
    /// A successful slot.
    #[must_use]
    pub const fn ok() -> Self {
        Self { error: None }
    }

    /// A failed slot.
    #[must_use]
    pub fn err(err: &ApiError) -> Self {
        Self {
            error: Some(err.into()),
        }
    }
}

/// Bulk results carrying only success or failure per slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResults {
    /// One slot per argument, in argument order.
    pub results: Vec<ErrorResult>,
}

/// One slot of a bulk life query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifeResult {
    /// The entity's lifecycle value, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life: Option<String>,
    /// The failure, if the slot failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Bulk results of a life query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifeResults {
    /// One slot per argument, in argument order.
    pub results: Vec<LifeResult>,
}

/// One entity's status update in a bulk call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStatusArgs {
    /// The target entity's tag string.
    pub tag: String,
    /// The status to record.
    pub status: Status,
    /// Human-readable context.
    #[serde(default)]
    pub info: String,
    /// Structured payload.
    #[serde(default)]
    pub data: StatusData,
}

/// Bulk status-update arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStatusArgs {
    /// The updates, in caller order.
    pub entities: Vec<EntityStatusArgs>,
}

/// One filter constraint in a capacity query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceTypesConstraint {
    /// The constraint to filter by; absent means no filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CapacityConstraint>,
}

/// Bulk capacity-query arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceTypesConstraints {
    /// The constraints, in caller order.
    pub constraints: Vec<InstanceTypesConstraint>,
}

/// One slot of a bulk capacity query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceTypesResult {
    /// Matching instance descriptors, on success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_types: Vec<InstanceType>,
    /// The unit costs are expressed in, e.g. `USD/h`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cost_unit: String,
    /// ISO currency code for the costs.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cost_currency: String,
    /// The failure, if the slot failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Bulk results of a capacity query.
///
/// Same length and order as the constraints that produced them; position
/// is the correlation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceTypesResults {
    /// One slot per constraint, in constraint order.
    pub results: Vec<InstanceTypesResult>,
}
