//! Process-wide registry of compiled message types.
//!
//! The registry starts empty, only ever grows, and holds at most one
//! descriptor per schema id. First-time lookups that race on the same id
//! share a single in-flight initialisation, so a schema is parsed and
//! compiled once and every caller receives the same `Arc`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::descriptor::TypeDescriptor;

type Slot = Arc<OnceCell<Arc<TypeDescriptor>>>;

static GLOBAL: LazyLock<Arc<TypeRegistry>> = LazyLock::new(|| Arc::new(TypeRegistry::new()));

/// Append-only map from schema id to compiled type.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> Arc<TypeRegistry> {
        GLOBAL.clone()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, schema_id: &str) -> Slot {
        self.slots()
            .entry(schema_id.to_string())
            .or_default()
            .clone()
    }

    /// Returns the compiled type for a schema id, if present.
    pub fn get(&self, schema_id: &str) -> Option<Arc<TypeDescriptor>> {
        self.slots().get(schema_id)?.get().cloned()
    }

    /// Returns true if a compiled type is registered under the id.
    pub fn contains(&self, schema_id: &str) -> bool {
        self.get(schema_id).is_some()
    }

    /// Number of compiled types.
    pub fn len(&self) -> usize {
        self.slots().values().filter(|s| s.initialized()).count()
    }

    /// Returns true if nothing has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the registered schema ids, sorted.
    pub fn schema_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .slots()
            .iter()
            .filter(|(_, s)| s.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Registers a compiled type.
    ///
    /// If the id is already registered, the existing descriptor is kept and
    /// returned.
    pub fn insert(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let slot = self.slot(descriptor.schema_id());
        let descriptor = Arc::new(descriptor);
        match slot.set(descriptor.clone()) {
            Ok(()) => {
                debug!(schema_id = %descriptor.schema_id(), "Registered message type");
                descriptor
            }
            Err(_) => slot.get().cloned().unwrap_or(descriptor),
        }
    }

    /// Returns the registered type, running `init` only if no other caller
    /// has registered or is currently initialising the id.
    ///
    /// A failed initialisation leaves the id unregistered; a later call
    /// retries.
    pub async fn get_or_try_init<F, Fut, E>(&self, schema_id: &str, init: F) -> Result<Arc<TypeDescriptor>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TypeDescriptor, E>>,
    {
        let slot = self.slot(schema_id);
        let descriptor = slot
            .get_or_try_init(|| async move {
                let descriptor = init().await?;
                debug!(schema_id = %descriptor.schema_id(), "Compiled message type");
                Ok::<_, E>(Arc::new(descriptor))
            })
            .await?;
        Ok(descriptor.clone())
    }
}
