//! Concrete facade implementations and their registration.

pub mod agent;
pub mod provider;

pub use agent::{AgentApiV1, AgentApiV2};
pub use provider::{EnvironBackend, ProviderApi, ProviderBackend};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::registry::FacadeRegistry;

/// Register every facade this controller serves.
///
/// Called exactly once at startup, before the registry is shared.
///
/// # Errors
///
/// Fails on duplicate registration, which indicates an init bug.
pub fn register_default_facades(
    registry: &mut FacadeRegistry,
    backend: Arc<dyn ProviderBackend>,
) -> Result<()> {
    registry.register(
        "Provider",
        1,
        Box::new(move |ctx| {
            Ok(Box::new(ProviderApi::new(
                Arc::clone(&backend),
                ctx.authorizer.as_ref(),
            )?))
        }),
    )?;
    registry.register("Agent", 1, Box::new(|ctx| Ok(Box::new(AgentApiV1::new(ctx)?))))?;
    registry.register("Agent", 2, Box::new(|ctx| Ok(Box::new(AgentApiV2::new(ctx)?))))?;
    Ok(())
}

pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ApiError::BadRequest(format!("invalid arguments: {e}")))
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::AuthContext;
    use crate::dispatch::ApiRoot;
    use crate::params::{ErrorResults, LifeResults};
    use fleetd_core::Tag;
    use fleetd_provider::ManualProvider;
    use fleetd_state::{State, Status};
    use tempfile::TempDir;

    fn setup() -> (Arc<ApiRoot>, State, TempDir) {
        let dir = TempDir::new().unwrap();
        let state = State::open(dir.path()).unwrap();
        state.add_unit("mysql").unwrap();

        let mut registry = FacadeRegistry::new();
        let backend: Arc<dyn ProviderBackend> =
            Arc::new(EnvironBackend::new(Arc::new(ManualProvider)));
        register_default_facades(&mut registry, backend).unwrap();

        let root = Arc::new(ApiRoot::new(Arc::new(registry), state.clone()));
        (root, state, dir)
    }

    fn agent_conn(root: &Arc<ApiRoot>, tag: &str) -> crate::dispatch::ApiConn {
        root.connect(Arc::new(AuthContext {
            tag: Tag::parse(tag).unwrap(),
            controller_admin: false,
        }))
    }

    #[test]
    fn default_registrations() {
        let (root, _state, _dir) = setup();
        let registry = root.registry();
        assert_eq!(registry.versions("Agent"), vec![1, 2]);
        assert_eq!(registry.versions("Provider"), vec![1]);
    }

    #[test]
    fn versions_are_independent_contracts() {
        let (root, state, _dir) = setup();
        let conn = agent_conn(&root, "unit-mysql-0");

        let set_args = serde_json::json!({
            "entities": [{"tag": "unit-mysql-0", "status": "error", "info": "hook failed"}]
        });

        // v1's behavior: the error status lands on the workload record,
        // and SetAgentStatus does not exist.
        let results: ErrorResults = serde_json::from_value(
            conn.call("Agent", 1, "", "SetStatus", set_args.clone()).unwrap(),
        )
        .unwrap();
        assert!(results.results[0].error.is_none());
        let err = conn
            .call("Agent", 1, "", "SetAgentStatus", set_args.clone())
            .unwrap_err();
        assert_eq!(err.code(), "not_implemented");

        // v2 on the same connection adds the direct write.
        let results: ErrorResults = serde_json::from_value(
            conn.call("Agent", 2, "", "SetAgentStatus", set_args).unwrap(),
        )
        .unwrap();
        assert!(results.results[0].error.is_none());

        let unit = state.unit("mysql/0").unwrap();
        assert_eq!(unit.status().unwrap().status, Status::Error);
        assert_eq!(unit.agent().status().unwrap().status, Status::Error);
    }

    #[test]
    fn life_through_dispatch() {
        let (root, _state, _dir) = setup();
        let conn = agent_conn(&root, "unit-mysql-0");

        let results: LifeResults = serde_json::from_value(
            conn.call(
                "Agent",
                2,
                "",
                "Life",
                serde_json::json!({"entities": [{"tag": "unit-mysql-0"}]}),
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(results.results[0].life.as_deref(), Some("alive"));
    }

    #[test]
    fn provider_gate_applies_through_dispatch() {
        let (root, state, _dir) = setup();
        state.add_user("admin", "password", true).unwrap();
        state.add_user("bob", "password", false).unwrap();

        let plain = root.connect(Arc::new(AuthContext {
            tag: Tag::user("bob").unwrap(),
            controller_admin: false,
        }));
        let err = plain
            .call(
                "Provider",
                1,
                "",
                "InstanceTypes",
                serde_json::json!({"constraints": []}),
            )
            .unwrap_err();
        assert_eq!(err.code(), "permission_denied");

        let admin = root.connect(Arc::new(AuthContext {
            tag: Tag::user("admin").unwrap(),
            controller_admin: true,
        }));
        let result = admin
            .call(
                "Provider",
                1,
                "",
                "InstanceTypes",
                serde_json::json!({"constraints": [{}]}),
            )
            .unwrap();
        let results: crate::params::InstanceTypesResults =
            serde_json::from_value(result).unwrap();
        assert_eq!(
            results.results[0].error.as_ref().unwrap().code,
            "not_supported"
        );
    }
}
