//! Cross-Context Transfer
//!
//! Moving entities from one context to another is a backend capability with
//! two concrete strategies:
//!
//! - [`HandleHop`]: capture context-independent handles on the origin queue,
//!   then resolve them on the destination queue. Both queues are found through
//!   the [`ContextRegistry`](crate::registry::ContextRegistry). Used where
//!   sessions are independent and objects are strictly thread-affine.
//! - [`KeyLookup`]: read each entity's stable key and look it up in the
//!   destination context on its own queue. Used where sessions share one
//!   object graph.
//!
//! Both deliver the result through the completion exactly once, on the
//! destination queue. Elements that cannot be captured or resolved are dropped;
//! the surviving elements keep their input order.

pub mod handle_hop;
pub mod key_lookup;

pub use handle_hop::{HandleHop, HandleSession};
pub use key_lookup::{KeyLookup, KeyedSession};

use crate::context::ContextRef;
use crate::entity::Entity;
use crate::error::StorageError;

/// Receives the transferred entities on the destination queue
pub type EntitiesCompletion = Box<dyn FnOnce(Vec<Entity>) + Send + 'static>;

pub trait TransferStrategy: Send + Sync {
    /// Start a transfer. Precondition failures are returned before any work is
    /// dispatched; once this returns `Ok` the completion will run exactly once.
    fn transfer(
        &self,
        destination: &ContextRef,
        origin: &ContextRef,
        entities: Vec<Entity>,
        completion: EntitiesCompletion,
    ) -> Result<(), StorageError>;
}
