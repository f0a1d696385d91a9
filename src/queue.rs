//! Serial Execution Queues
//!
//! Every execution context is bound to exactly one `ExecutionQueue`. A queue owns
//! a dedicated worker thread that runs submitted jobs strictly one at a time, in
//! submission order, so routing all work for a context through its queue gives
//! per-context mutual exclusion without a global lock.
//!
//! The worker only holds the receiving half of the job channel. When the last
//! strong `ExecutionQueue` handle is dropped the channel closes, pending jobs are
//! drained and the thread exits. `WeakQueue` lets bookkeeping structures observe
//! that without keeping the queue alive.

use crate::error::StorageError;
use crate::types::QueueId;
use std::cell::Cell;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static CURRENT_QUEUE: Cell<Option<QueueId>> = const { Cell::new(None) };
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Jobs accepted by `dispatch`
    pub dispatched: u64,
    /// Jobs the worker has finished (including ones that panicked)
    pub completed: u64,
}

#[derive(Default)]
struct QueueCounters {
    dispatched: AtomicU64,
    completed: AtomicU64,
}

struct QueueShared {
    id: QueueId,
    label: String,
    sender: mpsc::UnboundedSender<Job>,
    counters: Arc<QueueCounters>,
}

/// Strong handle to a serial execution queue.
#[derive(Clone)]
pub struct ExecutionQueue {
    shared: Arc<QueueShared>,
}

impl ExecutionQueue {
    /// Start a new queue with its own worker thread
    pub fn new(label: impl Into<String>) -> Result<Self, StorageError> {
        let label = label.into();
        let id = QueueId::next();
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let counters = Arc::new(QueueCounters::default());

        let worker_counters = counters.clone();
        std::thread::Builder::new()
            .name(format!("storagekit-{}", label))
            .spawn(move || run_worker(id, receiver, worker_counters))?;

        debug!(queue = %id, label = %label, "Execution queue started");
        Ok(Self {
            shared: Arc::new(QueueShared {
                id,
                label,
                sender,
                counters,
            }),
        })
    }

    pub fn id(&self) -> QueueId {
        self.shared.id
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Submit a job. Never blocks; the job runs after every job submitted before it.
    pub fn dispatch<F>(&self, job: F) -> Result<(), StorageError>
    where
        F: FnOnce() + Send + 'static,
    {
        let counters = &self.shared.counters;
        counters.dispatched.fetch_add(1, Ordering::SeqCst);
        self.shared.sender.send(Box::new(job)).map_err(|_| {
            counters.dispatched.fetch_sub(1, Ordering::SeqCst);
            StorageError::QueueClosed(self.shared.label.clone())
        })
    }

    /// Queue whose worker is executing the calling code, if any.
    pub fn current() -> Option<QueueId> {
        CURRENT_QUEUE.with(|current| current.get())
    }

    /// Whether the caller is running on this queue's worker.
    pub fn is_current(&self) -> bool {
        Self::current() == Some(self.shared.id)
    }

    pub fn downgrade(&self) -> WeakQueue {
        WeakQueue {
            id: self.shared.id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            dispatched: self.shared.counters.dispatched.load(Ordering::SeqCst),
            completed: self.shared.counters.completed.load(Ordering::SeqCst),
        }
    }
}

impl PartialEq for ExecutionQueue {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for ExecutionQueue {}

impl fmt::Debug for ExecutionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("id", &self.shared.id)
            .field("label", &self.shared.label)
            .finish()
    }
}

/// Non-owning handle to an `ExecutionQueue`.
#[derive(Clone)]
pub struct WeakQueue {
    id: QueueId,
    shared: Weak<QueueShared>,
}

impl WeakQueue {
    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn upgrade(&self) -> Option<ExecutionQueue> {
        self.shared.upgrade().map(|shared| ExecutionQueue { shared })
    }

    pub fn is_live(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

impl fmt::Debug for WeakQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakQueue")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

fn run_worker(id: QueueId, mut receiver: mpsc::UnboundedReceiver<Job>, counters: Arc<QueueCounters>) {
    CURRENT_QUEUE.with(|current| current.set(Some(id)));

    while let Some(job) = receiver.blocking_recv() {
        // A panicking job must not take the rest of the queue down with it.
        if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(queue = %id, "Queued job panicked");
        }
        counters.completed.fetch_add(1, Ordering::SeqCst);
    }

    debug!(queue = %id, "Execution queue stopped");
}
