//! Registry liveness and eviction

use super::test_utils::{in_background, memory_store};
use std::time::Duration;
use storagekit::backend::{IsolatedContext, IsolatedStorage};
use storagekit::context::ContextRef;
use storagekit::queue::ExecutionQueue;
use storagekit::registry::{BindingStatus, ContextRegistry};

const SHORT_SWEEP: Duration = Duration::from_millis(20);

#[test]
fn registered_context_resolves_to_its_queue() {
    let registry = ContextRegistry::new();
    let queue = ExecutionQueue::new("owner").unwrap();
    let context: ContextRef = IsolatedContext::new(queue.clone(), memory_store());

    registry.register(Some(&context), &queue);

    let found = registry.lookup_queue(context.as_ref()).unwrap();
    assert_eq!(found, queue);
    assert_eq!(registry.status(context.id()), BindingStatus::Live);
}

#[test]
fn missing_context_is_ignored() {
    let registry = ContextRegistry::new();
    let queue = ExecutionQueue::new("owner").unwrap();

    registry.register(None, &queue);

    assert!(registry.is_empty());
}

#[test]
fn re_registration_replaces_binding() {
    let registry = ContextRegistry::new();
    let first = ExecutionQueue::new("first").unwrap();
    let second = ExecutionQueue::new("second").unwrap();
    let context: ContextRef = IsolatedContext::new(first.clone(), memory_store());

    registry.register(Some(&context), &first);
    registry.register(Some(&context), &second);

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.lookup_queue(context.as_ref()).unwrap(), second);
}

#[test]
fn dropped_queue_makes_binding_stale_until_swept() {
    let registry = ContextRegistry::new();
    let owner = ExecutionQueue::new("owner").unwrap();
    let context: ContextRef = IsolatedContext::new(owner, memory_store());

    let detached = ExecutionQueue::new("detached").unwrap();
    registry.register(Some(&context), &detached);
    drop(detached);

    // Dead bindings are invisible to lookups before the sweep removes them.
    assert!(registry.lookup_queue(context.as_ref()).is_none());
    assert_eq!(registry.status(context.id()), BindingStatus::Stale);

    assert_eq!(registry.sweep(), 1);
    assert_eq!(registry.status(context.id()), BindingStatus::Absent);
    assert!(registry.lookup_queue(context.as_ref()).is_none());
}

#[test]
fn sweep_keeps_live_bindings() {
    let registry = ContextRegistry::new();
    let live_queue = ExecutionQueue::new("live").unwrap();
    let live: ContextRef = IsolatedContext::new(live_queue.clone(), memory_store());
    registry.register(Some(&live), &live_queue);

    let dead_queue = ExecutionQueue::new("dead").unwrap();
    let dead: ContextRef = IsolatedContext::new(dead_queue.clone(), memory_store());
    let dead_id = dead.id();
    registry.register(Some(&dead), &dead_queue);
    drop(dead);
    drop(dead_queue);

    assert_eq!(registry.sweep(), 1);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.status(live.id()), BindingStatus::Live);
    assert_eq!(registry.status(dead_id), BindingStatus::Absent);

    // A second sweep over the same state is a no-op.
    assert_eq!(registry.sweep(), 0);
}

#[test]
fn registry_does_not_keep_contexts_alive() {
    let registry = ContextRegistry::new();
    let queue = ExecutionQueue::new("owner").unwrap();
    let context: ContextRef = IsolatedContext::new(queue.clone(), memory_store());
    let weak = std::sync::Arc::downgrade(&context);

    registry.register(Some(&context), &queue);
    drop(context);

    assert!(weak.upgrade().is_none());
}

#[test]
fn finished_background_contexts_are_swept() {
    let storage = IsolatedStorage::new(memory_store(), SHORT_SWEEP).unwrap();
    assert!(storage.sweeper().is_running());

    for _ in 0..20 {
        in_background(&storage, |context| context.id());
    }

    std::thread::sleep(Duration::from_millis(500));
    // Only the main context is left.
    assert_eq!(storage.registry().len(), 1);
}

#[test]
fn dropping_the_storage_stops_the_sweep() {
    let storage = IsolatedStorage::new(memory_store(), SHORT_SWEEP).unwrap();
    let registry = storage.registry().clone();
    assert!(storage.sweeper().is_running());
    drop(storage);

    let queue = ExecutionQueue::new("after-drop").unwrap();
    let context: ContextRef = IsolatedContext::new(queue.clone(), memory_store());
    let id = context.id();
    registry.register(Some(&context), &queue);
    drop(context);

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(registry.status(id), BindingStatus::Stale);
}
