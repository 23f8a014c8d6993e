//! Provider capability-query contract.
//!
//! Each cloud backend exposes a single operation: given a filter
//! constraint, return the instance types it can supply plus cost metadata,
//! or fail with a distinguished not-supported condition. Backends are
//! independently-failing leaves; this crate defines the uniform contract
//! and the two in-tree implementations (a static catalog and the manual
//! backend, which cannot query capacity).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;

pub use catalog::StaticCatalog;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A result type using `ProviderError`.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors a capability query can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The backend does not implement this capability.
    #[error("{0} not supported")]
    NotSupported(&'static str),

    /// No instance type satisfies the constraint.
    #[error("instance types matching constraint not found")]
    NoneMatch,

    /// The backend failed internally.
    #[error("provider error: {0}")]
    Internal(String),
}

/// A filter applied when querying instance types.
///
/// Unset fields do not filter; an empty constraint matches everything the
/// backend offers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapacityConstraint {
    /// Minimum CPU core count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u64>,
    /// Minimum memory, in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    /// Required architecture, e.g. `amd64`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl CapacityConstraint {
    /// True if the given descriptor satisfies this constraint.
    #[must_use]
    pub fn matches(&self, instance_type: &InstanceType) -> bool {
        if let Some(cores) = self.cpu_cores {
            if instance_type.cpu_cores < cores {
                return false;
            }
        }
        if let Some(memory) = self.memory_mb {
            if instance_type.memory_mb < memory {
                return false;
            }
        }
        if let Some(arch) = &self.arch {
            if !instance_type.arches.iter().any(|a| a == arch) {
                return false;
            }
        }
        true
    }
}

/// A purchasable instance shape offered by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceType {
    /// Backend-specific name, e.g. `m4.large`.
    pub name: String,
    /// Supported architectures.
    pub arches: Vec<String>,
    /// CPU core count.
    pub cpu_cores: u64,
    /// Memory, in megabytes.
    pub memory_mb: u64,
    /// Root disk size, in megabytes, if fixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_disk_mb: Option<u64>,
    /// Relative cost in the backend's cost unit.
    pub cost: u64,
    /// True if the backend has deprecated this shape.
    #[serde(default)]
    pub deprecated: bool,
}

/// The successful result of one capacity query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTypesWithCostMetadata {
    /// Matching instance types.
    pub instance_types: Vec<InstanceType>,
    /// The unit costs are expressed in, e.g. `USD/h`.
    pub cost_unit: String,
    /// ISO currency code for the costs.
    pub cost_currency: String,
}

/// The capability-query contract every backend implements.
pub trait CapacityQuery: Send + Sync {
    /// Return the instance types satisfying `constraint`.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotSupported`] if the backend cannot enumerate
    /// capacity, [`ProviderError::NoneMatch`] if nothing satisfies the
    /// constraint.
    fn instance_types(
        &self,
        constraint: &CapacityConstraint,
    ) -> Result<InstanceTypesWithCostMetadata>;
}

/// A backend for manually-managed machines.
///
/// Capacity is whatever the operator enlists by hand, so there is nothing
/// to enumerate.
#[derive(Debug, Default)]
pub struct ManualProvider;

impl CapacityQuery for ManualProvider {
    fn instance_types(
        &self,
        _constraint: &CapacityConstraint,
    ) -> Result<InstanceTypesWithCostMetadata> {
        Err(ProviderError::NotSupported("instance types"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, cores: u64, memory: u64) -> InstanceType {
        InstanceType {
            name: name.to_string(),
            arches: vec!["amd64".to_string()],
            cpu_cores: cores,
            memory_mb: memory,
            root_disk_mb: None,
            cost: cores * 10,
            deprecated: false,
        }
    }

    #[test]
    fn empty_constraint_matches_everything() {
        let constraint = CapacityConstraint::default();
        assert!(constraint.matches(&descriptor("small", 1, 1024)));
        assert!(constraint.matches(&descriptor("huge", 64, 262_144)));
    }

    #[test]
    fn constraint_fields_are_minimums() {
        let constraint = CapacityConstraint {
            cpu_cores: Some(4),
            memory_mb: Some(8192),
            arch: None,
        };
        assert!(!constraint.matches(&descriptor("small", 2, 16_384)));
        assert!(!constraint.matches(&descriptor("thin", 8, 4096)));
        assert!(constraint.matches(&descriptor("fit", 4, 8192)));
    }

    #[test]
    fn arch_must_be_offered() {
        let constraint = CapacityConstraint {
            arch: Some("arm64".to_string()),
            ..CapacityConstraint::default()
        };
        assert!(!constraint.matches(&descriptor("amd-only", 4, 8192)));

        let mut multi = descriptor("multi", 4, 8192);
        multi.arches.push("arm64".to_string());
        assert!(constraint.matches(&multi));
    }

    #[test]
    fn manual_provider_is_not_supported() {
        let err = ManualProvider
            .instance_types(&CapacityConstraint::default())
            .unwrap_err();
        assert_eq!(err, ProviderError::NotSupported("instance types"));
        assert_eq!(err.to_string(), "instance types not supported");
    }
}
