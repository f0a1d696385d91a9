//! Isolated backend
//!
//! Every context is an independent session with its own store handle and its
//! own private queue. Objects are live views bound to the context that
//! produced them and may only be touched on that context's queue, so moving
//! them between contexts goes through the registry-driven handle hop.

use crate::context::{ensure_on_queue, ContextRef, StorageContext};
use crate::entity::{Entity, EntityHandle, Fields, Record, Value};
use crate::error::StorageError;
use crate::queue::ExecutionQueue;
use crate::registry::{ContextRegistry, SweepTask};
use crate::storage::{SaveFailure, Storage, TaskClosure, SAVE_FAILURE_CAPACITY};
use crate::store::RecordStore;
use crate::transfer::{EntitiesCompletion, HandleHop, HandleSession, TransferStrategy};
use crate::types::{BackendKind, ContextId, EntityKey, QueueId};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub struct IsolatedContext {
    id: ContextId,
    queue: ExecutionQueue,
    store: Arc<dyn RecordStore>,
    this: Weak<IsolatedContext>,
}

impl IsolatedContext {
    /// Create a context owned by `queue`. The context keeps its queue alive.
    pub fn new(queue: ExecutionQueue, store: Arc<dyn RecordStore>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: ContextId::next(),
            queue,
            store,
            this: this.clone(),
        })
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    fn guard(&self) -> Result<(), StorageError> {
        ensure_on_queue(self.id, self.queue.id())
    }

    fn bind(&self, key: EntityKey) -> Result<Entity, StorageError> {
        let context = self
            .this
            .upgrade()
            .ok_or(StorageError::ContextNotFound(self.id))?;
        Ok(Entity::Live(LiveObject { key, context }))
    }
}

impl fmt::Debug for IsolatedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedContext")
            .field("id", &self.id)
            .field("queue", &self.queue.id())
            .finish()
    }
}

impl StorageContext for IsolatedContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Isolated
    }

    fn queue_id(&self) -> QueueId {
        self.queue.id()
    }

    fn create(&self, entity_name: &str, fields: Fields) -> Result<Entity, StorageError> {
        self.guard()?;
        let record = Record::new(EntityKey::new(entity_name), fields);
        self.store.put(&record)?;
        self.bind(record.key)
    }

    fn fetch(&self, entity_name: &str) -> Result<Vec<Entity>, StorageError> {
        self.guard()?;
        self.store
            .scan(entity_name)?
            .into_iter()
            .map(|record| self.bind(record.key))
            .collect()
    }

    fn object_with_key(&self, key: &EntityKey) -> Result<Option<Entity>, StorageError> {
        self.guard()?;
        match self.store.get(key)? {
            Some(record) => self.bind(record.key).map(Some),
            None => Ok(None),
        }
    }

    fn delete(&self, entity: &Entity) -> Result<(), StorageError> {
        self.guard()?;
        self.store.remove(entity.key())
    }

    fn save(&self) -> Result<(), StorageError> {
        self.guard()?;
        self.store.flush()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl HandleSession for IsolatedContext {
    const BACKEND: BackendKind = BackendKind::Isolated;

    fn capture(&self, entity: Entity) -> Option<EntityHandle> {
        let Entity::Live(object) = entity else {
            return None;
        };
        match object.is_deleted() {
            Ok(false) => Some(EntityHandle {
                key: object.key,
                origin: self.id,
            }),
            Ok(true) => None,
            Err(err) => {
                debug!(context = %self.id, error = %err, "Entity not capturable");
                None
            }
        }
    }

    fn resolve(&self, handle: &EntityHandle) -> Option<Entity> {
        self.object_with_key(&handle.key).ok().flatten()
    }
}

/// Live view of one stored object, bound to an `IsolatedContext`.
#[derive(Clone)]
pub struct LiveObject {
    key: EntityKey,
    context: Arc<IsolatedContext>,
}

impl LiveObject {
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id
    }

    fn record(&self) -> Result<Record, StorageError> {
        self.context.guard()?;
        self.context
            .store
            .get(&self.key)?
            .ok_or_else(|| StorageError::EntityNotFound(self.key.clone()))
    }

    pub fn get(&self, field: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.record()?.fields.get(field).cloned())
    }

    pub fn set(&self, field: &str, value: Value) -> Result<(), StorageError> {
        let mut record = self.record()?;
        record.fields.insert(field.to_string(), value);
        self.context.store.put(&record)
    }

    pub fn snapshot(&self) -> Result<Record, StorageError> {
        self.record()
    }

    pub fn is_deleted(&self) -> Result<bool, StorageError> {
        self.context.guard()?;
        Ok(self.context.store.get(&self.key)?.is_none())
    }
}

impl fmt::Debug for LiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveObject")
            .field("key", &self.key)
            .field("context", &self.context.id)
            .finish()
    }
}

/// Storage whose sessions are independent and registry-tracked.
pub struct IsolatedStorage {
    store: Arc<dyn RecordStore>,
    main_context: Arc<IsolatedContext>,
    transfer: HandleHop<IsolatedContext>,
    save_failures: broadcast::Sender<SaveFailure>,
    sweeper: SweepTask,
}

impl IsolatedStorage {
    pub fn new(store: Arc<dyn RecordStore>, sweep_interval: Duration) -> Result<Self, StorageError> {
        let registry = ContextRegistry::shared();

        let main_queue = ExecutionQueue::new("isolated-main")?;
        let main_context = IsolatedContext::new(main_queue.clone(), store.clone());
        let main_ref: ContextRef = main_context.clone();
        registry.register(Some(&main_ref), &main_queue);

        let sweeper = SweepTask::spawn(&registry, sweep_interval)?;
        let (save_failures, _) = broadcast::channel(SAVE_FAILURE_CAPACITY);

        info!(main_context = %main_context.id, "Isolated storage ready");
        Ok(Self {
            store,
            main_context,
            transfer: HandleHop::new(registry),
            save_failures,
            sweeper,
        })
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        self.transfer.registry()
    }

    pub fn sweeper(&self) -> &SweepTask {
        &self.sweeper
    }
}

impl Storage for IsolatedStorage {
    fn backend(&self) -> BackendKind {
        BackendKind::Isolated
    }

    fn main_context(&self) -> Option<ContextRef> {
        Some(self.main_context.clone())
    }

    fn perform_main_task(&self, task: TaskClosure) -> Result<(), StorageError> {
        let context: ContextRef = self.main_context.clone();
        self.main_context.queue.dispatch(move || task(context))
    }

    fn perform_background_task(&self, task: TaskClosure) -> Result<(), StorageError> {
        let queue = ExecutionQueue::new("isolated-background")?;
        let context: ContextRef = IsolatedContext::new(queue.clone(), self.store.clone());
        self.registry().register(Some(&context), &queue);
        debug!(context = %context.id(), queue = %queue.id(), "Background context created");

        queue.dispatch(move || task(context))
    }

    fn transfer_entities(
        &self,
        destination: &ContextRef,
        origin: &ContextRef,
        entities: Vec<Entity>,
        completion: EntitiesCompletion,
    ) -> Result<(), StorageError> {
        self.transfer
            .transfer(destination, origin, entities, completion)
    }

    fn subscribe_save_failures(&self) -> broadcast::Receiver<SaveFailure> {
        self.save_failures.subscribe()
    }
}
