//! Import orchestration: the worker pipeline, the scheduling surface and
//! the progress/status event channels.

pub mod events;
pub mod runner;
pub mod worker;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

pub use events::{ImporterEvents, ImporterStatusEvent, ImporterStreams};
pub use runner::{ImportRequest, ImporterService};
pub use worker::ImportWorker;

/// Cooperative cancellation flags, keyed by importer id and shared between
/// the service surface and running workers. Workers check the flag between
/// chunk dispatches; in-flight fetches are allowed to complete.
#[derive(Clone, Default)]
pub struct CancelFlags {
    inner: Arc<Mutex<HashSet<Uuid>>>,
}

impl CancelFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: Uuid) {
        self.lock().insert(id);
    }

    pub fn clear(&self, id: Uuid) {
        self.lock().remove(&id);
    }

    pub fn is_set(&self, id: Uuid) -> bool {
        self.lock().contains(&id)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        // a panicked holder leaves only a flag set behind, safe to reuse
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
