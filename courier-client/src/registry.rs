//! Task registry: demultiplexes transport callbacks back to the request
//! that owns them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::request::RequestState;

/// Identifier of one transport-level task.
pub type TaskId = u64;

/// Concurrency-safe map from transport task identifiers to the request state
/// that owns them.
///
/// Lookups from concurrent transport callbacks proceed in parallel;
/// registrations and removals are mutually exclusive with each other and
/// with lookups. This is what lets one shared transport fan callbacks out to
/// many independently-owned requests.
#[derive(Default)]
pub struct TaskRegistry {
    entries: RwLock<HashMap<TaskId, Arc<RequestState>>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `id` with `request`. Registering an id that is already
    /// present is a programming error: the existing entry is kept, the call
    /// is rejected and logged.
    pub(crate) fn register(&self, id: TaskId, request: Arc<RequestState>) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            error!(task_id = id, "rejected duplicate task id registration");
            return false;
        }
        entries.insert(id, request);
        true
    }

    /// Look up the request owning `id`.
    pub(crate) fn lookup(&self, id: TaskId) -> Option<Arc<RequestState>> {
        self.entries.read().get(&id).cloned()
    }

    /// Remove the entry for `id`. Idempotent: removing an absent id is safe.
    pub(crate) fn unregister(&self, id: TaskId) -> Option<Arc<RequestState>> {
        self.entries.write().remove(&id)
    }

    /// All currently registered requests.
    pub(crate) fn snapshot(&self) -> Vec<Arc<RequestState>> {
        self.entries.read().values().cloned().collect()
    }

    /// Check if `id` is registered.
    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
