//! StorageKit: thread-confined persistence sessions
//!
//! Every storage session ([`context::StorageContext`]) is bound to exactly one
//! serial [`queue::ExecutionQueue`]. Entities fetched under a session may only be
//! touched on that session's queue; moving them to another session goes through
//! the transfer protocol ([`transfer`]), which either hops through
//! context-independent handles tracked by the [`registry`] or re-fetches by
//! stable key, depending on the backend.

pub mod backend;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod facade;
pub mod logging;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod store;
pub mod transfer;
pub mod types;

pub use context::{ContextRef, StorageContext};
pub use entity::{Entity, EntityHandle, Fields, Record, StorageEntity, Value};
pub use error::{ApiError, StorageError};
pub use facade::{open, StorageType};
pub use queue::ExecutionQueue;
pub use registry::ContextRegistry;
pub use storage::{SaveFailure, Storage, StorageExt};
pub use types::{BackendKind, ContextId, EntityKey, EntityKind};
