//! RPC dispatch: connections and the call path.
//!
//! A call is `(facade, version, object id, method, args)`. The connection
//! resolves the facade constructor, builds the facade bound to the
//! caller's authorization context (coarse capability gates run here), and
//! dispatches the method. Facade instances are cached per connection, so a
//! session keeps the API objects it has already been authorized for.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use fleetd_state::State;

use crate::authorizer::Authorizer;
use crate::error::{ApiError, Result};
use crate::registry::{Facade, FacadeContext, FacadeRegistry};
use crate::resources::Resources;

/// The server-side root shared by every connection.
pub struct ApiRoot {
    registry: Arc<FacadeRegistry>,
    state: State,
}

impl ApiRoot {
    /// Build the root over a populated registry and the shared store.
    #[must_use]
    pub fn new(registry: Arc<FacadeRegistry>, state: State) -> Self {
        Self { registry, state }
    }

    /// The facade registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<FacadeRegistry> {
        &self.registry
    }

    /// The shared store.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Open a connection for an authenticated caller.
    #[must_use]
    pub fn connect(self: &Arc<Self>, authorizer: Arc<dyn Authorizer>) -> ApiConn {
        ApiConn {
            root: Arc::clone(self),
            authorizer,
            resources: Arc::new(Resources::new()),
            facades: Mutex::new(HashMap::new()),
        }
    }
}

/// One authenticated caller's connection.
pub struct ApiConn {
    root: Arc<ApiRoot>,
    authorizer: Arc<dyn Authorizer>,
    resources: Arc<Resources>,
    facades: Mutex<HashMap<(String, u32), Arc<dyn Facade>>>,
}

impl ApiConn {
    /// The connection's authorization context.
    #[must_use]
    pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
        &self.authorizer
    }

    /// The connection's resource registry.
    #[must_use]
    pub fn resources(&self) -> &Arc<Resources> {
        &self.resources
    }

    /// Dispatch one call.
    ///
    /// # Errors
    ///
    /// `ApiError::NotFound` for an unknown facade or version,
    /// `ApiError::NotImplemented` for an unknown method,
    /// `ApiError::PermissionDenied` if a capability gate fails, or
    /// whatever the method itself fails with.
    pub fn call(
        &self,
        facade: &str,
        version: u32,
        object_id: &str,
        method: &str,
        args: Value,
    ) -> Result<Value> {
        if !object_id.is_empty() {
            return Err(ApiError::BadRequest(
                "object ids are not supported".to_string(),
            ));
        }

        let instance = self.facade(facade, version)?;
        tracing::debug!(facade, version, method, "dispatching call");
        instance.call(method, args)
    }

    /// Release everything the connection holds. Called on close.
    pub fn close(&self) {
        self.facades.lock().clear();
        self.resources.stop_all();
    }

    fn facade(&self, name: &str, version: u32) -> Result<Arc<dyn Facade>> {
        let key = (name.to_string(), version);
        if let Some(instance) = self.facades.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        let factory = self.root.registry.resolve(name, version)?;
        let context = FacadeContext {
            state: self.root.state.clone(),
            resources: Arc::clone(&self.resources),
            authorizer: Arc::clone(&self.authorizer),
        };
        let instance: Arc<dyn Facade> = Arc::from(factory(&context)?);
        self.facades.lock().insert(key, Arc::clone(&instance));
        Ok(instance)
    }
}
