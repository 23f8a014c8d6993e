//! HTTP gateway for the fleetd controller.
//!
//! The gateway is a thin transport shell over `fleetd-api`: login resolves
//! an authenticated session, and `/v1/rpc` dispatches facade calls on it.
//! All control-plane semantics live below this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{GatewayConfig, Substrate};
pub use error::GatewayError;
pub use routes::create_router;
pub use state::{GatewayState, SessionTable};

use std::sync::Arc;

use fleetd_api::{register_default_facades, ApiRoot, EnvironBackend, FacadeRegistry, ProviderBackend};
use fleetd_provider::{CapacityQuery, InstanceType, ManualProvider, StaticCatalog};
use fleetd_state::State;

/// Build the gateway state: store, facade registry, authenticators.
///
/// # Errors
///
/// Fails if the store cannot be opened or facade registration fails.
pub fn build_gateway(config: GatewayConfig) -> Result<GatewayState, Box<dyn std::error::Error>> {
    let state = State::open(&config.data_dir)?;
    build_gateway_with_state(config, state)
}

/// Build the gateway over an already-opened store.
///
/// # Errors
///
/// Fails if facade registration fails or the admin bootstrap cannot write.
pub fn build_gateway_with_state(
    config: GatewayConfig,
    state: State,
) -> Result<GatewayState, Box<dyn std::error::Error>> {
    if let Some(password) = &config.admin_password {
        bootstrap_admin(&state, password)?;
    }

    let environ: Arc<dyn CapacityQuery> = match config.substrate {
        Substrate::Manual => Arc::new(ManualProvider),
        Substrate::Catalog => Arc::new(demo_catalog()),
    };
    let backend: Arc<dyn ProviderBackend> = Arc::new(EnvironBackend::new(environ));

    let mut registry = FacadeRegistry::new();
    register_default_facades(&mut registry, backend)?;

    let root = Arc::new(ApiRoot::new(Arc::new(registry), state));
    let authenticators = Arc::new(fleetd_auth::AuthenticatorRegistry::default());

    Ok(GatewayState::new(root, authenticators, config))
}

/// Create the `admin` controller-admin user if it does not exist yet.
fn bootstrap_admin(state: &State, password: &str) -> Result<(), fleetd_state::StateError> {
    match state.user("admin") {
        Ok(_) => Ok(()),
        Err(err) if err.is_not_found() => {
            state.add_user("admin", password, true)?;
            tracing::info!("bootstrapped admin user");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// The instance types served when `FLEETD_SUBSTRATE=catalog`.
fn demo_catalog() -> StaticCatalog {
    StaticCatalog::new(
        vec![
            InstanceType {
                name: "standard-2".to_string(),
                arches: vec!["amd64".to_string()],
                cpu_cores: 2,
                memory_mb: 4096,
                root_disk_mb: Some(20_480),
                cost: 20,
                deprecated: false,
            },
            InstanceType {
                name: "standard-4".to_string(),
                arches: vec!["amd64".to_string(), "arm64".to_string()],
                cpu_cores: 4,
                memory_mb: 8192,
                root_disk_mb: Some(40_960),
                cost: 40,
                deprecated: false,
            },
            InstanceType {
                name: "standard-8".to_string(),
                arches: vec!["amd64".to_string(), "arm64".to_string()],
                cpu_cores: 8,
                memory_mb: 32_768,
                root_disk_mb: Some(40_960),
                cost: 80,
                deprecated: false,
            },
        ],
        "USD/h",
        "USD",
    )
}
