//! Static instance-type catalog backend.

use crate::{
    CapacityConstraint, CapacityQuery, InstanceType, InstanceTypesWithCostMetadata, ProviderError,
    Result,
};

/// A backend that serves a fixed catalog of instance types.
///
/// Used for substrates whose offerings are known up front, and as the
/// deterministic backend in tests.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    instance_types: Vec<InstanceType>,
    cost_unit: String,
    cost_currency: String,
}

impl StaticCatalog {
    /// Create a catalog over the given descriptors.
    #[must_use]
    pub fn new(
        instance_types: Vec<InstanceType>,
        cost_unit: impl Into<String>,
        cost_currency: impl Into<String>,
    ) -> Self {
        Self {
            instance_types,
            cost_unit: cost_unit.into(),
            cost_currency: cost_currency.into(),
        }
    }
}

impl CapacityQuery for StaticCatalog {
    fn instance_types(
        &self,
        constraint: &CapacityConstraint,
    ) -> Result<InstanceTypesWithCostMetadata> {
        let matching: Vec<InstanceType> = self
            .instance_types
            .iter()
            .filter(|it| constraint.matches(it))
            .cloned()
            .collect();

        if matching.is_empty() {
            return Err(ProviderError::NoneMatch);
        }

        Ok(InstanceTypesWithCostMetadata {
            instance_types: matching,
            cost_unit: self.cost_unit.clone(),
            cost_currency: self.cost_currency.clone(),
        })
    }
}
