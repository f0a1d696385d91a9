//! Hierarchical backend: save propagation, key-lookup transfer, save failures

use super::test_utils::{completion_channel, in_background, memory_store, on_main, WAIT};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use storagekit::backend::{HierarchicalStorage, IsolatedStorage, ManagedObject};
use storagekit::entity::{fields, Entity, Fields, Record, Value};
use storagekit::queue::ExecutionQueue;
use storagekit::store::{RecordStore, SledRecordStore};
use storagekit::types::EntityKey;
use storagekit::{Storage, StorageContext, StorageError, StorageExt};
use tokio::sync::broadcast::error::TryRecvError;

/// Store that accepts reads and refuses every write.
struct ReadOnlyStore;

impl RecordStore for ReadOnlyStore {
    fn get(&self, _key: &EntityKey) -> Result<Option<Record>, StorageError> {
        Ok(None)
    }

    fn put(&self, _record: &Record) -> Result<(), StorageError> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "store is read-only").into())
    }

    fn remove(&self, _key: &EntityKey) -> Result<(), StorageError> {
        Ok(())
    }

    fn scan(&self, _entity_name: &str) -> Result<Vec<Record>, StorageError> {
        Ok(Vec::new())
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

fn sled_backed() -> (HierarchicalStorage, SledRecordStore) {
    let store = SledRecordStore::temporary().unwrap();
    let storage = HierarchicalStorage::new(Arc::new(store.clone())).unwrap();
    (storage, store)
}

#[test]
fn child_save_reaches_the_store_through_the_root() {
    let (storage, store) = sled_backed();

    let key = in_background(&storage, |context| {
        let entity = context.create("Note", fields([("body", "hello")])).unwrap();
        context.save().unwrap();
        entity.key().clone()
    });

    // Runs after the root save the child's save scheduled on the main queue.
    on_main(&storage, |_| ());
    assert!(!storage.root().has_changes());

    let record = store.get(&key).unwrap().unwrap();
    assert_eq!(record.fields.get("body"), Some(&Value::from("hello")));
}

#[test]
fn unsaved_child_changes_stay_private() {
    let (storage, store) = sled_backed();

    let key = in_background(&storage, |context| {
        context.create("Note", fields([("body", "draft")])).unwrap().key().clone()
    });

    let seen_by_root = on_main(&storage, {
        let key = key.clone();
        move |context| context.object_with_key(&key).unwrap().is_some()
    });
    assert!(!seen_by_root);
    assert!(store.get(&key).unwrap().is_none());
}

#[test]
fn child_save_does_not_change_a_running_main_task() {
    let (storage, _store) = sled_backed();
    let (entered_tx, entered) = std::sync::mpsc::channel();
    let (release, gate) = std::sync::mpsc::channel::<()>();
    let (counts_tx, counts) = std::sync::mpsc::channel();

    storage
        .perform_main(move |context| {
            let before = context.fetch("Note").unwrap().len();
            let _ = entered_tx.send(());
            let _ = gate.recv_timeout(WAIT);
            let after = context.fetch("Note").unwrap().len();
            let _ = counts_tx.send((before, after));
        })
        .unwrap();
    entered.recv_timeout(WAIT).unwrap();

    in_background(&storage, |context| {
        context.create("Note", fields([("body", "late")])).unwrap();
        context.save().unwrap();
    });
    release.send(()).unwrap();

    assert_eq!(counts.recv_timeout(WAIT).unwrap(), (0, 0));
    let seen_later = on_main(&storage, |context| context.fetch("Note").unwrap().len());
    assert_eq!(seen_later, 1);
}

#[test]
fn fetch_matches_the_entity_name_exactly() {
    let (storage, _store) = sled_backed();
    let isolated = IsolatedStorage::new(memory_store(), Duration::from_secs(180)).unwrap();

    let hierarchical_count = on_main(&storage, |context| {
        context.create("A", Fields::new()).unwrap();
        context.create("A/B", Fields::new()).unwrap();
        context.save().unwrap();
        context.fetch("A").unwrap().len()
    });
    let isolated_names = on_main(&isolated, |context| {
        context.create("A", Fields::new()).unwrap();
        context.create("A/B", Fields::new()).unwrap();
        context
            .fetch("A")
            .unwrap()
            .iter()
            .map(|entity| entity.entity_name().to_string())
            .collect::<Vec<_>>()
    });

    assert_eq!(hierarchical_count, 1);
    assert_eq!(isolated_names, vec!["A".to_string()]);
}

#[test]
fn key_lookup_transfer_moves_saved_objects_in_order() {
    let (storage, _store) = sled_backed();
    let storage = Arc::new(storage);
    let main = storage.main_context().unwrap();
    let main_queue = main.queue_id();
    let main_id = main.id();

    let task_storage = storage.clone();
    let (tx, rx) = std::sync::mpsc::channel();
    storage
        .perform_background(move |context| {
            let mut objects: Vec<ManagedObject> = ["one", "two", "three"]
                .iter()
                .map(|title| match context.create("Task", fields([("title", *title)])).unwrap() {
                    Entity::Managed(object) => object,
                    Entity::Live(_) => unreachable!(),
                })
                .collect();
            context.save().unwrap();

            // Created after the save, so the root cannot find it.
            match context.create("Task", fields([("title", "draft")])).unwrap() {
                Entity::Managed(object) => objects.insert(1, object),
                Entity::Live(_) => unreachable!(),
            }

            task_storage
                .get_thread_safe_entities(&main, &context, objects, move |moved: Vec<ManagedObject>| {
                    let titles: Vec<_> = moved
                        .iter()
                        .map(|object| object.get("title").unwrap().unwrap())
                        .collect();
                    let bound: Vec<_> = moved.iter().map(|object| object.context_id()).collect();
                    let _ = tx.send((ExecutionQueue::current(), bound, titles));
                })
                .unwrap();
        })
        .unwrap();

    let (on_queue, bound, titles) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(on_queue, Some(main_queue));
    assert_eq!(bound, vec![main_id; 3]);
    assert_eq!(
        titles,
        vec![Value::from("one"), Value::from("two"), Value::from("three")]
    );
}

#[test]
fn key_lookup_drops_live_objects_from_mixed_sequences() {
    let (storage, _store) = sled_backed();
    let main = storage.main_context().unwrap();

    let isolated = IsolatedStorage::new(memory_store(), Duration::from_secs(180)).unwrap();
    let live = on_main(&isolated, |context| context.create("Task", fields([("title", "x")])).unwrap());

    let managed = on_main(&storage, |context| {
        let entity = context.create("Task", fields([("title", "kept")])).unwrap();
        context.save().unwrap();
        entity
    });

    let (completion, rx) = completion_channel::<Vec<Entity>>();
    storage
        .get_thread_safe_entities(&main, &main, vec![live, managed], completion)
        .unwrap();

    let moved = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].entity_name(), "Task");
}

#[test]
fn root_save_failure_is_published() {
    let storage = HierarchicalStorage::new(Arc::new(ReadOnlyStore)).unwrap();
    let root_id = storage.root().id();
    let mut failures = storage.subscribe_save_failures();

    in_background(&storage, |context| {
        context.create("Note", fields([("body", "lost?")])).unwrap();
        context.save().unwrap();
    });
    on_main(&storage, |_| ());

    let failure = failures.try_recv().unwrap();
    assert_eq!(failure.context, root_id);
    assert!(failure.message.contains("read-only"));
    assert!(matches!(failures.try_recv(), Err(TryRecvError::Empty)));

    // The failed changes are kept on the root for a later retry.
    assert!(storage.root().has_changes());
}

#[test]
fn root_save_error_is_returned_to_direct_callers() {
    let storage = HierarchicalStorage::new(Arc::new(ReadOnlyStore)).unwrap();

    let (saved, still_visible) = on_main(&storage, |context| {
        let entity = context.create("Note", fields([("body", "x")])).unwrap();
        let saved = context.save();
        let visible = context.object_with_key(entity.key()).unwrap().is_some();
        (saved.is_err(), visible)
    });
    assert!(saved);
    assert!(still_visible);
}
