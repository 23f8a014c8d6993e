//! Gateway application state.
//!
//! This module defines the shared state available to all request handlers,
//! including the table of authenticated sessions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use fleetd_api::{ApiConn, ApiRoot};
use fleetd_auth::AuthenticatorRegistry;

use crate::config::GatewayConfig;

/// Authenticated connections, keyed by session id.
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<Uuid, Arc<ApiConn>>>,
}

impl SessionTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, returning its session id.
    pub fn insert(&self, conn: Arc<ApiConn>) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.write().insert(id, conn);
        id
    }

    /// Look up a live session.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<Arc<ApiConn>> {
        self.sessions.read().get(id).cloned()
    }

    /// Close a session, releasing the connection's resources.
    ///
    /// Returns false if the session does not exist.
    pub fn close(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().remove(id);
        match removed {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }
}

/// Shared application state for the gateway.
#[derive(Clone)]
pub struct GatewayState {
    /// The API root shared by every connection.
    pub root: Arc<ApiRoot>,
    /// Authenticator dispatch for login.
    pub authenticators: Arc<AuthenticatorRegistry>,
    /// Live authenticated sessions.
    pub sessions: Arc<SessionTable>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl GatewayState {
    /// Create a new gateway state.
    #[must_use]
    pub fn new(
        root: Arc<ApiRoot>,
        authenticators: Arc<AuthenticatorRegistry>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            root,
            authenticators,
            sessions: Arc::new(SessionTable::new()),
            config,
        }
    }
}
