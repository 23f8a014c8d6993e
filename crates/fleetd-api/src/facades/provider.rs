//! The Provider facade: cloud capability queries.

use std::sync::Arc;

use serde_json::Value;

use fleetd_provider::CapacityQuery;

use crate::authorizer::Authorizer;
use crate::error::{ApiError, Result};
use crate::facades::{parse_args, to_value};
use crate::params::{InstanceTypesConstraints, InstanceTypesResult, InstanceTypesResults};
use crate::registry::Facade;

/// The operations the Provider facade needs, and nothing more.
pub trait ProviderBackend: Send + Sync {
    /// The capacity-query backend for the model's substrate.
    ///
    /// # Errors
    ///
    /// Fails if the substrate cannot be opened.
    fn environ(&self) -> Result<Arc<dyn CapacityQuery>>;
}

/// A backend over an already-opened capacity-query implementation.
pub struct EnvironBackend {
    environ: Arc<dyn CapacityQuery>,
}

impl EnvironBackend {
    /// Wrap a capacity-query backend.
    #[must_use]
    pub fn new(environ: Arc<dyn CapacityQuery>) -> Self {
        Self { environ }
    }
}

impl ProviderBackend for EnvironBackend {
    fn environ(&self) -> Result<Arc<dyn CapacityQuery>> {
        Ok(Arc::clone(&self.environ))
    }
}

/// Provider facade, version 1.
pub struct ProviderApi {
    backend: Arc<dyn ProviderBackend>,
}

impl ProviderApi {
    /// Construct the facade, gating on the model-manager capability.
    ///
    /// # Errors
    ///
    /// `ApiError::PermissionDenied` unless the caller manages models.
    pub fn new(backend: Arc<dyn ProviderBackend>, authorizer: &dyn Authorizer) -> Result<Self> {
        if !authorizer.auth_model_manager() {
            return Err(ApiError::PermissionDenied);
        }
        Ok(Self { backend })
    }

    /// Query available instance types for each constraint.
    ///
    /// The result list has the same length and order as the constraint
    /// list; each slot is independently a success payload or a structured
    /// error, so one constraint's failure never aborts its siblings.
    ///
    /// # Errors
    ///
    /// Fails only if the substrate itself cannot be opened; per-constraint
    /// failures live in their slots.
    pub fn instance_types(&self, args: &InstanceTypesConstraints) -> Result<InstanceTypesResults> {
        let environ = self.backend.environ()?;

        let results = args
            .constraints
            .iter()
            .map(|constraint| {
                let value = constraint.value.clone().unwrap_or_default();
                match environ.instance_types(&value) {
                    Ok(found) => InstanceTypesResult {
                        instance_types: found.instance_types,
                        cost_unit: found.cost_unit,
                        cost_currency: found.cost_currency,
                        error: None,
                    },
                    Err(err) => InstanceTypesResult {
                        error: Some((&ApiError::from(err)).into()),
                        ..InstanceTypesResult::default()
                    },
                }
            })
            .collect();

        Ok(InstanceTypesResults { results })
    }
}

impl Facade for ProviderApi {
    fn call(&self, method: &str, args: Value) -> Result<Value> {
        match method {
            "InstanceTypes" => {
                let args: InstanceTypesConstraints = parse_args(args)?;
                to_value(&self.instance_types(&args)?)
            }
            other => Err(ApiError::NotImplemented(format!(
                "method \"{other}\" on facade \"Provider\" (version 1)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::AuthContext;
    use crate::params::InstanceTypesConstraint;
    use fleetd_core::Tag;
    use fleetd_provider::{CapacityConstraint, InstanceType, ManualProvider, StaticCatalog};

    fn catalog_backend() -> Arc<dyn ProviderBackend> {
        let catalog = StaticCatalog::new(
            vec![
                InstanceType {
                    name: "instancetype-1".to_string(),
                    arches: vec!["amd64".to_string()],
                    cpu_cores: 4,
                    memory_mb: 8192,
                    root_disk_mb: None,
                    cost: 40,
                    deprecated: false,
                },
                InstanceType {
                    name: "instancetype-2".to_string(),
                    arches: vec!["amd64".to_string()],
                    cpu_cores: 8,
                    memory_mb: 16_384,
                    root_disk_mb: None,
                    cost: 80,
                    deprecated: false,
                },
            ],
            "USD/h",
            "USD",
        );
        Arc::new(EnvironBackend::new(Arc::new(catalog)))
    }

    fn model_manager() -> AuthContext {
        AuthContext {
            tag: Tag::user("admin").unwrap(),
            controller_admin: true,
        }
    }

    #[test]
    fn construction_requires_model_manager() {
        let plain = AuthContext {
            tag: Tag::user("bob").unwrap(),
            controller_admin: false,
        };
        let err = ProviderApi::new(catalog_backend(), &plain).unwrap_err();
        assert_eq!(err.code(), "permission_denied");

        assert!(ProviderApi::new(catalog_backend(), &model_manager()).is_ok());
    }

    #[test]
    fn per_constraint_results_are_position_correlated() {
        let api = ProviderApi::new(catalog_backend(), &model_manager()).unwrap();

        let over_9k = CapacityConstraint {
            cpu_cores: Some(9001),
            ..CapacityConstraint::default()
        };
        let args = InstanceTypesConstraints {
            constraints: vec![
                InstanceTypesConstraint { value: None },
                InstanceTypesConstraint {
                    value: Some(over_9k),
                },
            ],
        };

        let results = api.instance_types(&args).unwrap().results;
        assert_eq!(results.len(), 2);

        let hit = &results[0];
        assert!(hit.error.is_none());
        assert_eq!(hit.instance_types.len(), 2);
        assert_eq!(hit.instance_types[0].name, "instancetype-1");
        assert_eq!(hit.cost_unit, "USD/h");
        assert_eq!(hit.cost_currency, "USD");

        let miss = &results[1];
        assert!(miss.instance_types.is_empty());
        let error = miss.error.as_ref().unwrap();
        assert_eq!(error.code, "not_found");
    }

    #[test]
    fn unsupported_backend_fails_per_slot() {
        let backend = Arc::new(EnvironBackend::new(Arc::new(ManualProvider)));
        let api = ProviderApi::new(backend, &model_manager()).unwrap();

        let args = InstanceTypesConstraints {
            constraints: vec![InstanceTypesConstraint { value: None }],
        };
        let results = api.instance_types(&args).unwrap().results;
        assert_eq!(results.len(), 1);
        let error = results[0].error.as_ref().unwrap();
        assert_eq!(error.code, "not_supported");
        assert_eq!(error.message, "not supported: instance types");
    }

    #[test]
    fn empty_constraint_list_yields_empty_results() {
        let api = ProviderApi::new(catalog_backend(), &model_manager()).unwrap();
        let results = api
            .instance_types(&InstanceTypesConstraints {
                constraints: vec![],
            })
            .unwrap();
        assert!(results.results.is_empty());
    }

    #[test]
    fn dispatch_unknown_method_is_not_implemented() {
        let api = ProviderApi::new(catalog_backend(), &model_manager()).unwrap();
        let err = api.call("Provision", Value::Null).unwrap_err();
        assert_eq!(err.code(), "not_implemented");
    }

    #[test]
    fn dispatch_round_trips_through_json() {
        let api = ProviderApi::new(catalog_backend(), &model_manager()).unwrap();
        let args = serde_json::json!({"constraints": [{"value": {"cpu_cores": 8}}]});
        let result = api.call("InstanceTypes", args).unwrap();

        let results: InstanceTypesResults = serde_json::from_value(result).unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].instance_types.len(), 1);
        assert_eq!(results.results[0].instance_types[0].name, "instancetype-2");
    }
}
