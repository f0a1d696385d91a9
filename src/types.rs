//! Core identifiers shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Stable identity of an execution context.
///
/// Never derived from a memory address, so it stays meaningful as a registry
/// key after the context itself has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate the next process-unique context id
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ContextId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Identity of a serial execution queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(u64);

impl QueueId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        QueueId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue-{}", self.0)
    }
}

/// Stable key of a stored object: entity name plus a random id.
///
/// Keys are plain values and may cross queue boundaries freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity: String,
    pub id: Uuid,
}

impl EntityKey {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            id: Uuid::new_v4(),
        }
    }

    /// Byte key used by the record store; entity name first so one entity
    /// can be scanned by prefix.
    pub fn storage_key(&self) -> Vec<u8> {
        format!("{}/{}", self.entity, self.id).into_bytes()
    }

    pub fn storage_prefix(entity: &str) -> Vec<u8> {
        format!("{}/", entity).into_bytes()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.id)
    }
}

/// Storage engine family behind a `Storage` implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Sessions form a tree anchored at one root session.
    Hierarchical,
    /// Sessions are independent, each with its own storage handle.
    Isolated,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Hierarchical => "hierarchical",
            BackendKind::Isolated => "isolated",
        }
    }

    /// Entity kind this backend stores natively.
    pub fn native_entity(self) -> EntityKind {
        match self {
            BackendKind::Hierarchical => EntityKind::Managed,
            BackendKind::Isolated => EntityKind::Live,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hierarchical" => Ok(BackendKind::Hierarchical),
            "isolated" => Ok(BackendKind::Isolated),
            other => Err(format!(
                "Unknown backend: {} (must be 'hierarchical' or 'isolated')",
                other
            )),
        }
    }
}

/// Static kind of an entity sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Objects owned by a hierarchical session
    Managed,
    /// Objects owned by an isolated session
    Live,
    /// A sequence that may mix objects of either backend
    Any,
}

impl EntityKind {
    /// Whether a sequence of this kind can be handed to `backend`.
    pub fn accepted_by(self, backend: BackendKind) -> bool {
        self == EntityKind::Any || self == backend.native_entity()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Managed => "managed",
            EntityKind::Live => "live",
            EntityKind::Any => "any",
        };
        f.write_str(name)
    }
}
