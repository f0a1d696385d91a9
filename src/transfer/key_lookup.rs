//! Transfer by stable key within one object graph.

use crate::context::{downcast_context, ContextRef, StorageContext};
use crate::entity::Entity;
use crate::error::StorageError;
use crate::queue::ExecutionQueue;
use crate::transfer::{EntitiesCompletion, TransferStrategy};
use crate::types::{BackendKind, EntityKey};
use std::marker::PhantomData;
use tracing::debug;

/// A session that can be reached directly through its own queue.
pub trait KeyedSession: StorageContext {
    const BACKEND: BackendKind;

    fn queue(&self) -> &ExecutionQueue;
}

pub struct KeyLookup<S> {
    _session: PhantomData<fn() -> S>,
}

impl<S: KeyedSession> KeyLookup<S> {
    pub fn new() -> Self {
        Self {
            _session: PhantomData,
        }
    }
}

impl<S: KeyedSession> Default for KeyLookup<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: KeyedSession> TransferStrategy for KeyLookup<S> {
    fn transfer(
        &self,
        destination: &ContextRef,
        _origin: &ContextRef,
        entities: Vec<Entity>,
        completion: EntitiesCompletion,
    ) -> Result<(), StorageError> {
        let session = downcast_context::<S>(destination, S::BACKEND)?;
        let native = S::BACKEND.native_entity();

        // Keys are immutable identity and may be read from any queue.
        let keys: Vec<EntityKey> = entities
            .iter()
            .filter(|entity| entity.kind() == native)
            .map(|entity| entity.key().clone())
            .collect();
        drop(entities);

        let queue = session.queue().clone();
        let destination_id = session.id();
        queue.dispatch(move || {
            let requested = keys.len();
            let resolved: Vec<Entity> = keys
                .iter()
                .filter_map(|key| session.object_with_key(key).ok().flatten())
                .collect();
            if resolved.len() < requested {
                debug!(
                    destination = %destination_id,
                    dropped = requested - resolved.len(),
                    "Keys missing from destination context"
                );
            }
            completion(resolved);
        })
    }
}
