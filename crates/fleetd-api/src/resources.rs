//! Per-connection resource tracking.
//!
//! Facades may acquire longer-lived resources (watches, streams) tied to a
//! connection. The contract here is narrow: every registered resource is
//! stopped when the connection closes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// A stoppable per-connection resource.
pub trait Resource: Send + Sync {
    /// Release the resource. Must be safe to call more than once.
    fn stop(&self);
}

/// Registry of one connection's live resources.
#[derive(Default)]
pub struct Resources {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    entries: HashMap<String, Arc<dyn Resource>>,
}

impl Resources {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource, returning its connection-unique id.
    pub fn register(&self, resource: Arc<dyn Resource>) -> String {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id.to_string();
        inner.entries.insert(id.clone(), resource);
        id
    }

    /// Look up a registered resource.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Resource>> {
        self.inner.lock().entries.get(id).cloned()
    }

    /// Stop and drop one resource. Returns false if the id is unknown.
    pub fn stop(&self, id: &str) -> bool {
        let removed = self.inner.lock().entries.remove(id);
        match removed {
            Some(resource) => {
                resource.stop();
                true
            }
            None => false,
        }
    }

    /// Stop and drop every resource. Called when the connection closes.
    pub fn stop_all(&self) {
        let entries = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.entries)
        };
        for resource in entries.into_values() {
            resource.stop();
        }
    }

    /// Number of live resources.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}
