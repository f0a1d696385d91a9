//! Shared test utilities for integration tests
//!
//! Serialized environment setup plus helpers for running work on a context's
//! queue and waiting for it.

#![allow(dead_code)]

use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storagekit::context::ContextRef;
use storagekit::queue::ExecutionQueue;
use storagekit::store::{RecordStore, SledRecordStore};
use storagekit::{Storage, StorageExt};
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub const WAIT: Duration = Duration::from_secs(5);

const TRACKED_VARS: [&str; 5] = [
    "HOME",
    "XDG_CONFIG_HOME",
    "STORAGEKIT_ENV",
    "STORAGEKIT_STORAGE__BACKEND",
    "STORAGEKIT_REGISTRY__SWEEP_INTERVAL_SECS",
];

/// Environment variable state to restore after test
struct EnvState(Vec<(&'static str, Option<String>)>);

impl EnvState {
    fn capture() -> Self {
        Self(
            TRACKED_VARS
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        )
    }

    fn restore(self) {
        for (name, value) in self.0 {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME inside `test_dir`, the STORAGEKIT_*
/// overrides cleared and `vars` applied. The environment is restored afterwards.
pub fn with_test_env<F, R>(test_dir: &TempDir, vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_home = test_dir.path().join("home");
    let test_config_home = test_dir.path().join("config_home");
    std::fs::create_dir_all(&test_home).unwrap();
    std::fs::create_dir_all(&test_config_home).unwrap();

    for name in TRACKED_VARS.iter().filter(|name| name.starts_with("STORAGEKIT")) {
        std::env::remove_var(name);
    }
    std::env::set_var("HOME", test_home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", test_config_home.to_str().unwrap());
    for (name, value) in vars {
        std::env::set_var(name, value);
    }

    let result = f();

    env_state.restore();

    result
}

pub fn memory_store() -> Arc<dyn RecordStore> {
    Arc::new(SledRecordStore::temporary().unwrap())
}

/// Run `f` on `queue` and wait for its result.
pub fn run_on<R, F>(queue: &ExecutionQueue, f: F) -> R
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (tx, rx) = channel();
    queue
        .dispatch(move || {
            let _ = tx.send(f());
        })
        .unwrap();
    rx.recv_timeout(WAIT).unwrap()
}

/// Run `f` on a fresh background context and wait for its result.
pub fn in_background<R, F>(storage: &dyn Storage, f: F) -> R
where
    R: Send + 'static,
    F: FnOnce(ContextRef) -> R + Send + 'static,
{
    let (tx, rx) = channel();
    storage
        .perform_background(move |context| {
            let _ = tx.send(f(context));
        })
        .unwrap();
    rx.recv_timeout(WAIT).unwrap()
}

/// Run `f` against the main context on the main queue and wait for its result.
pub fn on_main<R, F>(storage: &dyn Storage, f: F) -> R
where
    R: Send + 'static,
    F: FnOnce(ContextRef) -> R + Send + 'static,
{
    let (tx, rx) = channel();
    storage
        .perform_main(move |context| {
            let _ = tx.send(f(context));
        })
        .unwrap();
    rx.recv_timeout(WAIT).unwrap()
}

/// A completion that forwards its argument, paired with the receiving end.
pub fn completion_channel<T: Send + 'static>() -> (impl FnOnce(T) + Send + 'static, Receiver<T>) {
    let (tx, rx) = channel();
    (
        move |value: T| {
            let _ = tx.send(value);
        },
        rx,
    )
}
