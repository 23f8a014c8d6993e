//! The versioned facade registry.
//!
//! A process-wide table mapping `(facade name, version)` to a constructor.
//! It is populated during initialization (registration takes `&mut self`,
//! so the single-writer-at-init invariant is enforced by the borrow
//! checker) and then shared immutably behind an `Arc` for the controller's
//! lifetime. Entries are never removed: multiple versions of one facade
//! coexist permanently so agents on older and newer API versions can both
//! be served.

use std::collections::HashMap;
use std::sync::Arc;

use fleetd_state::State;
use serde_json::Value;

use crate::authorizer::Authorizer;
use crate::error::{ApiError, Result};
use crate::resources::Resources;

/// Everything a facade constructor receives.
pub struct FacadeContext {
    /// The shared state store.
    pub state: State,
    /// The connection's resource registry.
    pub resources: Arc<Resources>,
    /// The connection's authorization context.
    pub authorizer: Arc<dyn Authorizer>,
}

/// A constructed, capability-checked API object bound to one connection.
pub trait Facade: Send + Sync {
    /// Dispatch one method call.
    ///
    /// # Errors
    ///
    /// `ApiError::NotImplemented` for unknown methods; otherwise whatever
    /// the method fails with.
    fn call(&self, method: &str, args: Value) -> Result<Value>;
}

/// A facade constructor. Coarse capability gates run here, so construction
/// itself can fail with a permission error.
pub type FacadeFactory = Box<dyn Fn(&FacadeContext) -> Result<Box<dyn Facade>> + Send + Sync>;

/// The process-wide facade table.
#[derive(Default)]
pub struct FacadeRegistry {
    entries: HashMap<(String, u32), FacadeFactory>,
}

impl FacadeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a facade version. Init-time only.
    ///
    /// # Errors
    ///
    /// Registering the same `(name, version)` twice is an error; existing
    /// entries are never replaced.
    pub fn register(&mut self, name: &str, version: u32, factory: FacadeFactory) -> Result<()> {
        let key = (name.to_string(), version);
        if self.entries.contains_key(&key) {
            return Err(ApiError::Internal(format!(
                "facade \"{name}\" version {version} already registered"
            )));
        }
        tracing::debug!(facade = %name, version, "registered facade");
        self.entries.insert(key, factory);
        Ok(())
    }

    /// Resolve the constructor for a facade name and version.
    ///
    /// # Errors
    ///
    /// `ApiError::NotFound` naming the facade and version.
    pub fn resolve(&self, name: &str, version: u32) -> Result<&FacadeFactory> {
        self.entries
            .get(&(name.to_string(), version))
            .ok_or_else(|| ApiError::NotFound(format!("facade \"{name}\" version {version}")))
    }

    /// The registered versions of a facade, ascending.
    #[must_use]
    pub fn versions(&self, name: &str) -> Vec<u32> {
        let mut versions: Vec<u32> = self
            .entries
            .keys()
            .filter(|(n, _)| n == name)
            .map(|&(_, v)| v)
            .collect();
        versions.sort_unstable();
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullFacade;

    impl Facade for NullFacade {
        fn call(&self, method: &str, _args: Value) -> Result<Value> {
            Err(ApiError::NotImplemented(format!("method \"{method}\"")))
        }
    }

    fn null_factory() -> FacadeFactory {
        Box::new(|_ctx| Ok(Box::new(NullFacade)))
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = FacadeRegistry::new();
        registry.register("Pinger", 1, null_factory()).unwrap();

        assert!(registry.resolve("Pinger", 1).is_ok());
        let err = registry.resolve("Pinger", 2).unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), "not found: facade \"Pinger\" version 2");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = FacadeRegistry::new();
        registry.register("Pinger", 1, null_factory()).unwrap();
        let err = registry.register("Pinger", 1, null_factory()).unwrap_err();
        assert_eq!(err.code(), "internal_error");
    }

    #[test]
    fn versions_coexist() {
        let mut registry = FacadeRegistry::new();
        registry.register("Agent", 2, null_factory()).unwrap();
        registry.register("Agent", 1, null_factory()).unwrap();
        registry.register("Provider", 1, null_factory()).unwrap();

        assert_eq!(registry.versions("Agent"), vec![1, 2]);
        assert_eq!(registry.versions("Provider"), vec![1]);
        assert!(registry.versions("Uniter").is_empty());
        assert!(registry.resolve("Agent", 1).is_ok());
        assert!(registry.resolve("Agent", 2).is_ok());
    }
}
