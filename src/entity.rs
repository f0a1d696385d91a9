//! Stored values, context-bound entities and context-independent handles.

use crate::backend::hierarchical::ManagedObject;
use crate::backend::isolated::LiveObject;
use crate::error::StorageError;
use crate::types::{ContextId, EntityKey, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

pub type Fields = BTreeMap<String, Value>;

/// Build a `Fields` map from `(name, value)` pairs
pub fn fields<I, K, V>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Persisted form of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: EntityKey,
    pub fields: Fields,
}

impl Record {
    pub fn new(key: EntityKey, fields: Fields) -> Self {
        Self { key, fields }
    }
}

/// Context-independent reference to a stored object.
///
/// Immutable; may be cloned and sent across queues without synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityHandle {
    pub key: EntityKey,
    /// Context the handle was captured from
    pub origin: ContextId,
}

/// An object bound to the context (and therefore the queue) that produced it.
///
/// `key`, `entity_name` and `context_id` are identity reads and are safe from
/// any queue. Field access is only allowed on the owning queue.
#[derive(Debug, Clone)]
pub enum Entity {
    Managed(ManagedObject),
    Live(LiveObject),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Managed(_) => EntityKind::Managed,
            Entity::Live(_) => EntityKind::Live,
        }
    }

    pub fn key(&self) -> &EntityKey {
        match self {
            Entity::Managed(obj) => obj.key(),
            Entity::Live(obj) => obj.key(),
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.key().entity
    }

    pub fn context_id(&self) -> ContextId {
        match self {
            Entity::Managed(obj) => obj.context_id(),
            Entity::Live(obj) => obj.context_id(),
        }
    }

    pub fn get(&self, field: &str) -> Result<Option<Value>, StorageError> {
        match self {
            Entity::Managed(obj) => obj.get(field),
            Entity::Live(obj) => obj.get(field),
        }
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<(), StorageError> {
        match self {
            Entity::Managed(obj) => obj.set(field, value.into()),
            Entity::Live(obj) => obj.set(field, value.into()),
        }
    }

    /// Current field values
    pub fn snapshot(&self) -> Result<Record, StorageError> {
        match self {
            Entity::Managed(obj) => obj.snapshot(),
            Entity::Live(obj) => obj.snapshot(),
        }
    }

    /// Whether the backing object no longer exists in the owning context
    pub fn is_deleted(&self) -> Result<bool, StorageError> {
        match self {
            Entity::Managed(obj) => obj.is_deleted(),
            Entity::Live(obj) => obj.is_deleted(),
        }
    }
}

/// Element type accepted by `StorageExt::get_thread_safe_entities`.
///
/// `KIND` is the static kind of a whole sequence and is checked against the
/// backend before any work is dispatched. Individual elements that do not
/// convert are dropped rather than rejected.
pub trait StorageEntity: Send + Sized + 'static {
    const KIND: EntityKind;

    fn into_entity(self) -> Option<Entity>;

    fn from_entity(entity: Entity) -> Option<Self>;
}

impl StorageEntity for Entity {
    const KIND: EntityKind = EntityKind::Any;

    fn into_entity(self) -> Option<Entity> {
        Some(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        Some(entity)
    }
}

impl StorageEntity for ManagedObject {
    const KIND: EntityKind = EntityKind::Managed;

    fn into_entity(self) -> Option<Entity> {
        Some(Entity::Managed(self))
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Managed(obj) => Some(obj),
            Entity::Live(_) => None,
        }
    }
}

impl StorageEntity for LiveObject {
    const KIND: EntityKind = EntityKind::Live;

    fn into_entity(self) -> Option<Entity> {
        Some(Entity::Live(self))
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Live(obj) => Some(obj),
            Entity::Managed(_) => None,
        }
    }
}
