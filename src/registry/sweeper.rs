//! Timer-driven registry sweep.
//!
//! The sweep task is owned by the storage that owns the registry. It runs on
//! the ambient tokio runtime when there is one; otherwise the task brings up
//! a single-worker runtime of its own. Dropping the `SweepTask` stops the
//! timer and shuts that runtime down. The loop also exits by itself once the
//! registry is gone.

use crate::error::StorageError;
use crate::registry::ContextRegistry;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

pub struct SweepTask {
    handle: Option<JoinHandle<()>>,
    runtime: Option<Runtime>,
    interval: Duration,
}

impl SweepTask {
    /// Start sweeping `registry` every `interval`.
    ///
    /// A zero interval is rejected with `InvalidSweepInterval`.
    pub fn spawn(registry: &Arc<ContextRegistry>, interval: Duration) -> Result<Self, StorageError> {
        if interval.is_zero() {
            return Err(StorageError::InvalidSweepInterval(interval));
        }

        let sweep = sweep_loop(Arc::downgrade(registry), interval);
        let (handle, runtime) = match Handle::try_current() {
            Ok(ambient) => (ambient.spawn(sweep), None),
            Err(_) => {
                let runtime = Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("storagekit-sweep")
                    .enable_time()
                    .build()?;
                (runtime.spawn(sweep), Some(runtime))
            }
        };

        debug!(
            interval_secs = interval.as_secs_f64(),
            owned_runtime = runtime.is_some(),
            "Registry sweep scheduled"
        );
        Ok(Self {
            handle: Some(handle),
            runtime,
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the timer. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Registry sweep cancelled");
        }
        // Does not block, so dropping from inside another runtime is fine.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn sweep_loop(registry: Weak<ContextRegistry>, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(registry) = registry.upgrade() else {
            debug!("Registry dropped; sweep task exiting");
            break;
        };
        registry.sweep();
    }
}
