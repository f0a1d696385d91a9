//! Two-phase transfer through entity handles.

use crate::context::{downcast_context, ContextRef, StorageContext};
use crate::entity::{Entity, EntityHandle};
use crate::error::StorageError;
use crate::registry::ContextRegistry;
use crate::transfer::{EntitiesCompletion, TransferStrategy};
use crate::types::BackendKind;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error};

/// Session operations the handle-hop protocol needs from a backend.
pub trait HandleSession: StorageContext {
    const BACKEND: BackendKind;

    /// Produce a handle for `entity`. Runs on this session's queue; `None` drops the entity.
    fn capture(&self, entity: Entity) -> Option<EntityHandle>;

    /// Bind `handle` to this session. Runs on this session's queue; `None` drops the element.
    fn resolve(&self, handle: &EntityHandle) -> Option<Entity>;
}

pub struct HandleHop<S> {
    registry: Arc<ContextRegistry>,
    _session: PhantomData<fn() -> S>,
}

impl<S: HandleSession> HandleHop<S> {
    pub fn new(registry: Arc<ContextRegistry>) -> Self {
        Self {
            registry,
            _session: PhantomData,
        }
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }
}

impl<S: HandleSession> TransferStrategy for HandleHop<S> {
    fn transfer(
        &self,
        destination: &ContextRef,
        origin: &ContextRef,
        entities: Vec<Entity>,
        completion: EntitiesCompletion,
    ) -> Result<(), StorageError> {
        let destination_session = downcast_context::<S>(destination, S::BACKEND)?;
        let origin_session = downcast_context::<S>(origin, S::BACKEND)?;

        let origin_queue = self
            .registry
            .lookup_queue(origin.as_ref())
            .ok_or(StorageError::ContextNotFound(origin.id()))?;
        let destination_queue = self
            .registry
            .lookup_queue(destination.as_ref())
            .ok_or(StorageError::ContextNotFound(destination.id()))?;

        let origin_id = origin.id();
        let destination_id = destination.id();
        let requested = entities.len();

        origin_queue.dispatch(move || {
            let handles: Vec<EntityHandle> = entities
                .into_iter()
                .filter_map(|entity| origin_session.capture(entity))
                .collect();
            if handles.len() < requested {
                debug!(
                    origin = %origin_id,
                    dropped = requested - handles.len(),
                    "Entities dropped during capture"
                );
            }

            let captured = handles.len();
            let hop = destination_queue.dispatch(move || {
                let resolved: Vec<Entity> = handles
                    .iter()
                    .filter_map(|handle| destination_session.resolve(handle))
                    .collect();
                if resolved.len() < captured {
                    debug!(
                        destination = %destination_id,
                        dropped = captured - resolved.len(),
                        "Handles dropped during resolve"
                    );
                }
                completion(resolved);
            });
            if let Err(err) = hop {
                error!(destination = %destination_id, error = %err, "Resolve phase could not be scheduled");
            }
        })
    }
}
