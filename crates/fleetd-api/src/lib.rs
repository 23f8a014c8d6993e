//! Versioned API facades and RPC dispatch for fleetd.
//!
//! This crate is the controller's RPC surface. A connecting caller is
//! authenticated (see `fleetd-auth`), given an [`Authorizer`] describing
//! its capabilities, and connected to the [`ApiRoot`]. Calls name a facade
//! and version; the [`FacadeRegistry`], populated once at startup and
//! immutable afterwards, resolves the constructor. Coarse capability
//! gates run at construction, and per-entity gates run per call.
//!
//! Multiple versions of one facade coexist permanently, so agents running
//! against older API versions keep working across controller upgrades.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetd_api::{
//!     register_default_facades, ApiRoot, AuthContext, EnvironBackend, FacadeRegistry,
//!     ProviderBackend,
//! };
//! use fleetd_core::Tag;
//! use fleetd_provider::ManualProvider;
//! use fleetd_state::State;
//!
//! let state = State::open("/tmp/fleetd-db").unwrap();
//! let mut registry = FacadeRegistry::new();
//! let backend: Arc<dyn ProviderBackend> =
//!     Arc::new(EnvironBackend::new(Arc::new(ManualProvider)));
//! register_default_facades(&mut registry, backend).unwrap();
//!
//! let root = Arc::new(ApiRoot::new(Arc::new(registry), state));
//! let conn = root.connect(Arc::new(AuthContext {
//!     tag: Tag::parse("unit-mysql-0").unwrap(),
//!     controller_admin: false,
//! }));
//! let result = conn.call(
//!     "Agent",
//!     2,
//!     "",
//!     "Life",
//!     serde_json::json!({"entities": [{"tag": "unit-mysql-0"}]}),
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod authorizer;
pub mod dispatch;
pub mod error;
pub mod facades;
pub mod params;
pub mod registry;
pub mod resources;

pub use authorizer::{AuthContext, Authorizer};
pub use dispatch::{ApiConn, ApiRoot};
pub use error::{ApiError, Result};
pub use facades::{
    register_default_facades, AgentApiV1, AgentApiV2, EnvironBackend, ProviderApi, ProviderBackend,
};
pub use registry::{Facade, FacadeContext, FacadeFactory, FacadeRegistry};
pub use resources::{Resource, Resources};
