//! The Storage capability exposed to application code.

use crate::context::ContextRef;
use crate::entity::{Entity, StorageEntity};
use crate::error::StorageError;
use crate::transfer::EntitiesCompletion;
use crate::types::{BackendKind, ContextId};
use tokio::sync::broadcast;

/// Work executed on a context's own queue
pub type TaskClosure = Box<dyn FnOnce(ContextRef) + Send + 'static>;

/// Capacity of the save-failure broadcast channel
pub(crate) const SAVE_FAILURE_CAPACITY: usize = 64;

/// A save that failed after it left the caller, e.g. while propagating
/// child changes into the root session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFailure {
    pub context: ContextId,
    pub message: String,
}

pub trait Storage: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// The primary session, bound to the main queue
    fn main_context(&self) -> Option<ContextRef>;

    /// Run `task` on the main queue against the main context
    fn perform_main_task(&self, task: TaskClosure) -> Result<(), StorageError>;

    /// Create a fresh context on a private queue and run `task` there.
    /// Returns once the task is queued; never waits for it.
    fn perform_background_task(&self, task: TaskClosure) -> Result<(), StorageError>;

    /// Move `entities`, fetched under `origin`, into `destination`.
    ///
    /// See [`crate::transfer`] for the delivery guarantees.
    fn transfer_entities(
        &self,
        destination: &ContextRef,
        origin: &ContextRef,
        entities: Vec<Entity>,
        completion: EntitiesCompletion,
    ) -> Result<(), StorageError>;

    /// Failures of saves performed on the caller's behalf
    fn subscribe_save_failures(&self) -> broadcast::Receiver<SaveFailure>;
}

/// Typed conveniences over [`Storage`].
pub trait StorageExt: Storage {
    fn perform_main<F>(&self, task: F) -> Result<(), StorageError>
    where
        F: FnOnce(ContextRef) + Send + 'static,
    {
        self.perform_main_task(Box::new(task))
    }

    fn perform_background<F>(&self, task: F) -> Result<(), StorageError>
    where
        F: FnOnce(ContextRef) + Send + 'static,
    {
        self.perform_background_task(Box::new(task))
    }

    /// Typed transfer. Rejects element types the backend cannot store with
    /// `EntityTypeMismatch` before anything is dispatched.
    fn get_thread_safe_entities<T, F>(
        &self,
        destination: &ContextRef,
        origin: &ContextRef,
        entities: Vec<T>,
        completion: F,
    ) -> Result<(), StorageError>
    where
        T: StorageEntity,
        F: FnOnce(Vec<T>) + Send + 'static,
    {
        let backend = self.backend();
        if !T::KIND.accepted_by(backend) {
            return Err(StorageError::EntityTypeMismatch {
                expected: backend.native_entity(),
                actual: T::KIND,
            });
        }

        let entities = entities.into_iter().filter_map(T::into_entity).collect();
        self.transfer_entities(
            destination,
            origin,
            entities,
            Box::new(move |resolved: Vec<Entity>| {
                completion(resolved.into_iter().filter_map(T::from_entity).collect())
            }),
        )
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
