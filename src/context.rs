//! Execution contexts: the session capability shared by both backends.

use crate::entity::{Entity, Fields};
use crate::error::StorageError;
use crate::queue::ExecutionQueue;
use crate::types::{BackendKind, ContextId, EntityKey, QueueId};
use std::any::Any;
use std::sync::{Arc, Weak};

/// A persistence session bound to exactly one serial execution queue.
///
/// Every method that touches stored data must be called from the owning
/// queue and fails with `StorageError::WrongQueue` otherwise.
pub trait StorageContext: Send + Sync + 'static {
    fn id(&self) -> ContextId;

    fn backend(&self) -> BackendKind;

    /// Queue that owns this context
    fn queue_id(&self) -> QueueId;

    /// Insert a new object and return it bound to this context
    fn create(&self, entity_name: &str, fields: Fields) -> Result<Entity, StorageError>;

    /// All objects of one entity visible to this context, ordered by key
    fn fetch(&self, entity_name: &str) -> Result<Vec<Entity>, StorageError>;

    /// Look up one object by its stable key
    fn object_with_key(&self, key: &EntityKey) -> Result<Option<Entity>, StorageError>;

    fn delete(&self, entity: &Entity) -> Result<(), StorageError>;

    fn save(&self) -> Result<(), StorageError>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Owning reference to a context of either backend
pub type ContextRef = Arc<dyn StorageContext>;

/// Non-owning reference, as held by the registry
pub type WeakContext = Weak<dyn StorageContext>;

/// Fail unless the caller runs on `queue`.
pub(crate) fn ensure_on_queue(context: ContextId, queue: QueueId) -> Result<(), StorageError> {
    if ExecutionQueue::current() == Some(queue) {
        Ok(())
    } else {
        Err(StorageError::WrongQueue { context })
    }
}

/// Recover the concrete session type behind a `ContextRef`.
pub fn downcast_context<C: StorageContext>(
    context: &ContextRef,
    expected: BackendKind,
) -> Result<Arc<C>, StorageError> {
    let id = context.id();
    context
        .clone()
        .into_any()
        .downcast::<C>()
        .map_err(|_| StorageError::ContextTypeMismatch {
            context: id,
            expected,
        })
}
