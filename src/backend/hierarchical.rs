//! Hierarchical backend
//!
//! Sessions form a tree anchored at one root session on the main queue. The
//! root owns the record store; every background session is a child of the
//! root with its own private queue and its own pending changes. Reads fall
//! through child -> parent -> store. Saving a child hands its changes to the
//! parent's queue, which merges them and then lets the save observer save the
//! root. The parent's pending state is only ever touched from its own queue.
//!
//! Because all sessions share one object graph, moving objects between them
//! needs no registry: the destination simply looks the keys up.

use crate::context::{ensure_on_queue, ContextRef, StorageContext};
use crate::entity::{Entity, Fields, Record, Value};
use crate::error::StorageError;
use crate::queue::ExecutionQueue;
use crate::storage::{SaveFailure, Storage, TaskClosure, SAVE_FAILURE_CAPACITY};
use crate::store::RecordStore;
use crate::transfer::{EntitiesCompletion, KeyLookup, KeyedSession, TransferStrategy};
use crate::types::{BackendKind, ContextId, EntityKey, QueueId};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Unsaved changes of one session. A key is never both upserted and deleted.
#[derive(Debug, Default)]
struct PendingChanges {
    upserts: BTreeMap<EntityKey, Record>,
    deletes: BTreeSet<EntityKey>,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    fn upsert(&mut self, record: Record) {
        self.deletes.remove(&record.key);
        self.upserts.insert(record.key.clone(), record);
    }

    fn delete(&mut self, key: EntityKey) {
        self.upserts.remove(&key);
        self.deletes.insert(key);
    }

    /// Apply `newer` on top of these changes
    fn absorb(&mut self, newer: PendingChanges) {
        for key in newer.deletes {
            self.delete(key);
        }
        for (_, record) in newer.upserts {
            self.upsert(record);
        }
    }

    fn overlay(&self, view: &mut BTreeMap<EntityKey, Record>, entity_name: &str) {
        for key in self.deletes.iter().filter(|k| k.entity == entity_name) {
            view.remove(key);
        }
        for (key, record) in self.upserts.iter().filter(|(k, _)| k.entity == entity_name) {
            view.insert(key.clone(), record.clone());
        }
    }
}

enum Backing {
    Store(Arc<dyn RecordStore>),
    Parent(Arc<HierarchicalContext>),
}

pub struct HierarchicalContext {
    id: ContextId,
    queue: ExecutionQueue,
    backing: Backing,
    observer: Option<Arc<SaveObserver>>,
    changes: Mutex<PendingChanges>,
    this: Weak<HierarchicalContext>,
}

impl HierarchicalContext {
    /// Root session writing straight to `store`
    pub fn root(queue: ExecutionQueue, store: Arc<dyn RecordStore>) -> Arc<Self> {
        Self::build(queue, Backing::Store(store), None)
    }

    /// Child session of `parent`. `observer` is told about every successful save.
    pub fn child(
        queue: ExecutionQueue,
        parent: Arc<HierarchicalContext>,
        observer: Option<Arc<SaveObserver>>,
    ) -> Arc<Self> {
        Self::build(queue, Backing::Parent(parent), observer)
    }

    fn build(
        queue: ExecutionQueue,
        backing: Backing,
        observer: Option<Arc<SaveObserver>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: ContextId::next(),
            queue,
            backing,
            observer,
            changes: Mutex::new(PendingChanges::default()),
            this: this.clone(),
        })
    }

    pub fn parent(&self) -> Option<&Arc<HierarchicalContext>> {
        match &self.backing {
            Backing::Parent(parent) => Some(parent),
            Backing::Store(_) => None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Whether this session holds unsaved changes
    pub fn has_changes(&self) -> bool {
        !self.changes.lock().is_empty()
    }

    fn guard(&self) -> Result<(), StorageError> {
        ensure_on_queue(self.id, self.queue.id())
    }

    fn bind(&self, key: EntityKey) -> Result<Entity, StorageError> {
        let context = self
            .this
            .upgrade()
            .ok_or(StorageError::ContextNotFound(self.id))?;
        Ok(Entity::Managed(ManagedObject { key, context }))
    }

    fn lookup(&self, key: &EntityKey) -> Result<Option<Record>, StorageError> {
        {
            let changes = self.changes.lock();
            if changes.deletes.contains(key) {
                return Ok(None);
            }
            if let Some(record) = changes.upserts.get(key) {
                return Ok(Some(record.clone()));
            }
        }
        match &self.backing {
            Backing::Parent(parent) => parent.lookup(key),
            Backing::Store(store) => store.get(key),
        }
    }

    fn collect(&self, entity_name: &str) -> Result<BTreeMap<EntityKey, Record>, StorageError> {
        let mut view = match &self.backing {
            Backing::Parent(parent) => parent.collect(entity_name)?,
            Backing::Store(store) => store
                .scan(entity_name)?
                .into_iter()
                .map(|record| (record.key.clone(), record))
                .collect(),
        };
        self.changes.lock().overlay(&mut view, entity_name);
        Ok(view)
    }

    fn update_field(&self, key: &EntityKey, field: &str, value: Value) -> Result<(), StorageError> {
        let mut record = self
            .lookup(key)?
            .ok_or_else(|| StorageError::EntityNotFound(key.clone()))?;
        record.fields.insert(field.to_string(), value);
        self.changes.lock().upsert(record);
        Ok(())
    }

    fn restore(&self, failed: PendingChanges) {
        let mut changes = self.changes.lock();
        let newer = std::mem::take(&mut *changes);
        let mut restored = failed;
        restored.absorb(newer);
        *changes = restored;
    }
}

fn write_changes(store: &dyn RecordStore, changes: &PendingChanges) -> Result<(), StorageError> {
    for key in &changes.deletes {
        store.remove(key)?;
    }
    for record in changes.upserts.values() {
        store.put(record)?;
    }
    store.flush()
}

impl fmt::Debug for HierarchicalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchicalContext")
            .field("id", &self.id)
            .field("queue", &self.queue.id())
            .field("parent", &self.parent().map(|p| p.id))
            .finish()
    }
}

impl StorageContext for HierarchicalContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Hierarchical
    }

    fn queue_id(&self) -> QueueId {
        self.queue.id()
    }

    fn create(&self, entity_name: &str, fields: Fields) -> Result<Entity, StorageError> {
        self.guard()?;
        let record = Record::new(EntityKey::new(entity_name), fields);
        let key = record.key.clone();
        self.changes.lock().upsert(record);
        self.bind(key)
    }

    fn fetch(&self, entity_name: &str) -> Result<Vec<Entity>, StorageError> {
        self.guard()?;
        self.collect(entity_name)?
            .into_keys()
            .map(|key| self.bind(key))
            .collect()
    }

    fn object_with_key(&self, key: &EntityKey) -> Result<Option<Entity>, StorageError> {
        self.guard()?;
        match self.lookup(key)? {
            Some(record) => self.bind(record.key).map(Some),
            None => Ok(None),
        }
    }

    fn delete(&self, entity: &Entity) -> Result<(), StorageError> {
        self.guard()?;
        self.changes.lock().delete(entity.key().clone());
        Ok(())
    }

    fn save(&self) -> Result<(), StorageError> {
        self.guard()?;
        let changes = std::mem::take(&mut *self.changes.lock());
        if changes.is_empty() {
            return Ok(());
        }

        match &self.backing {
            Backing::Parent(parent) => {
                debug!(
                    context = %self.id,
                    parent = %parent.id,
                    upserts = changes.upserts.len(),
                    deletes = changes.deletes.len(),
                    "Child changes handed to parent"
                );
                let target = parent.clone();
                let observer = self.observer.clone();
                parent.queue.dispatch(move || {
                    target.changes.lock().absorb(changes);
                    if let Some(observer) = observer {
                        observer.parent_did_absorb(&target);
                    }
                })
            }
            Backing::Store(store) => {
                if let Err(err) = write_changes(store.as_ref(), &changes) {
                    self.restore(changes);
                    return Err(err);
                }
                debug!(context = %self.id, "Root changes persisted");
                Ok(())
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl KeyedSession for HierarchicalContext {
    const BACKEND: BackendKind = BackendKind::Hierarchical;

    fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }
}

/// Object bound to a `HierarchicalContext`.
#[derive(Clone)]
pub struct ManagedObject {
    key: EntityKey,
    context: Arc<HierarchicalContext>,
}

impl ManagedObject {
    /// Stable object id; safe to read from any queue
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id
    }

    pub fn get(&self, field: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.snapshot()?.fields.get(field).cloned())
    }

    pub fn set(&self, field: &str, value: Value) -> Result<(), StorageError> {
        self.context.guard()?;
        self.context.update_field(&self.key, field, value)
    }

    pub fn snapshot(&self) -> Result<Record, StorageError> {
        self.context.guard()?;
        self.context
            .lookup(&self.key)?
            .ok_or_else(|| StorageError::EntityNotFound(self.key.clone()))
    }

    pub fn is_deleted(&self) -> Result<bool, StorageError> {
        self.context.guard()?;
        Ok(self.context.lookup(&self.key)?.is_none())
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedObject")
            .field("key", &self.key)
            .field("context", &self.context.id)
            .finish()
    }
}

/// Saves the root whenever it has merged a child's saved changes.
///
/// Runs on the root's queue. Root save failures are logged and published to
/// save-failure subscribers.
pub struct SaveObserver {
    failures: broadcast::Sender<SaveFailure>,
}

impl SaveObserver {
    pub fn new(failures: broadcast::Sender<SaveFailure>) -> Self {
        Self { failures }
    }

    fn parent_did_absorb(&self, parent: &HierarchicalContext) {
        if !parent.is_root() {
            return;
        }
        if let Err(err) = parent.save() {
            publish_failure(&self.failures, parent.id, &err);
        }
    }
}

fn publish_failure(failures: &broadcast::Sender<SaveFailure>, context: ContextId, err: &StorageError) {
    error!(context = %context, error = %err, "Propagated save failed");
    // No subscribers is not an error.
    let _ = failures.send(SaveFailure {
        context,
        message: err.to_string(),
    });
}

/// Storage whose sessions form a tree under one root.
pub struct HierarchicalStorage {
    root: Arc<HierarchicalContext>,
    observer: Arc<SaveObserver>,
    save_failures: broadcast::Sender<SaveFailure>,
    transfer: KeyLookup<HierarchicalContext>,
}

impl HierarchicalStorage {
    pub fn new(store: Arc<dyn RecordStore>) -> Result<Self, StorageError> {
        let main_queue = ExecutionQueue::new("hierarchical-main")?;
        let root = HierarchicalContext::root(main_queue, store);
        let (save_failures, _) = broadcast::channel(SAVE_FAILURE_CAPACITY);
        let observer = Arc::new(SaveObserver::new(save_failures.clone()));

        info!(root_context = %root.id, "Hierarchical storage ready");
        Ok(Self {
            root,
            observer,
            save_failures,
            transfer: KeyLookup::new(),
        })
    }

    pub fn root(&self) -> &Arc<HierarchicalContext> {
        &self.root
    }
}

impl Storage for HierarchicalStorage {
    fn backend(&self) -> BackendKind {
        BackendKind::Hierarchical
    }

    fn main_context(&self) -> Option<ContextRef> {
        Some(self.root.clone())
    }

    fn perform_main_task(&self, task: TaskClosure) -> Result<(), StorageError> {
        let context: ContextRef = self.root.clone();
        self.root.queue.dispatch(move || task(context))
    }

    fn perform_background_task(&self, task: TaskClosure) -> Result<(), StorageError> {
        let queue = ExecutionQueue::new("hierarchical-background")?;
        let context: ContextRef = HierarchicalContext::child(
            queue.clone(),
            self.root.clone(),
            Some(self.observer.clone()),
        );
        debug!(context = %context.id(), queue = %queue.id(), "Child context created");

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
