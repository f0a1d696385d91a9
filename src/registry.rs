//! Context Registry
//!
//! Remembers which execution queue owns which context. Both sides of a binding
//! are held weakly: the registry never keeps a context or a queue alive. An
//! entry whose context or queue has been dropped is dead; lookups treat it as
//! absent straight away, and `sweep` removes it.
//!
//! All mutation (register, sweep) goes through one write lock, lookups share
//! the read lock.

pub mod sweeper;

pub use sweeper::SweepTask;

use crate::context::{ContextRef, StorageContext, WeakContext};
use crate::queue::{ExecutionQueue, WeakQueue};
use crate::types::{ContextId, QueueId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Default interval between periodic sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 180;

/// Liveness of a context binding as seen by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStatus {
    /// Context and queue are both alive
    Live,
    /// Entry present, but its context or queue is gone; removed at the next sweep
    Stale,
    /// No entry: never registered, or already evicted
    Absent,
}

struct RegistryEntry {
    context: WeakContext,
    queue: WeakQueue,
}

impl RegistryEntry {
    fn is_live(&self) -> bool {
        self.context.strong_count() > 0 && self.queue.is_live()
    }
}

/// Process-wide map from context identity to its owning queue
#[derive(Default)]
pub struct ContextRegistry {
    entries: RwLock<HashMap<ContextId, RegistryEntry>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Bind `context` to `queue`, replacing any earlier binding. A missing context is ignored.
    pub fn register(&self, context: Option<&ContextRef>, queue: &ExecutionQueue) {
        let Some(context) = context else {
            return;
        };

        let id = context.id();
        let entry = RegistryEntry {
            context: Arc::downgrade(context),
            queue: queue.downgrade(),
        };
        let replaced = self.entries.write().insert(id, entry).is_some();
        debug!(context = %id, queue = %queue.id(), replaced, "Context registered");
    }

    /// Owning queue of `context`, if the binding exists and both ends are alive.
    pub fn lookup_queue(&self, context: &dyn StorageContext) -> Option<ExecutionQueue> {
        let entries = self.entries.read();
        let entry = entries.get(&context.id())?;
        if entry.context.strong_count() == 0 {
            return None;
        }
        entry.queue.upgrade()
    }

    /// Queue id recorded for `id`, live or not
    pub fn queue_id_of(&self, id: ContextId) -> Option<QueueId> {
        self.entries.read().get(&id).map(|entry| entry.queue.id())
    }

    pub fn status(&self, id: ContextId) -> BindingStatus {
        match self.entries.read().get(&id) {
            Some(entry) if entry.is_live() => BindingStatus::Live,
            Some(_) => BindingStatus::Stale,
            None => BindingStatus::Absent,
        }
    }

    /// Remove every dead entry. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live());
        let evicted = before - entries.len();
        if evicted > 0 {
            info!(evicted, remaining = entries.len(), "Registry sweep evicted stale contexts");
        } else {
            debug!(remaining = entries.len(), "Registry sweep found nothing to evict");
        }
        evicted
    }

    /// Number of entries, including stale ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
