//! Background worker pool for compaction passes and checkpoints
//!
//! Jobs are de-duplicated while queued: scheduling a compaction for a family
//! that already has one waiting is a no-op. Workers hold only a weak
//! reference to the store, so a queued job never keeps a closed store alive.

use crate::store::StoreInner;
use ndb_core::Result;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tracing::error;

/// Work a background thread can be asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Job {
    /// Full compaction pass over the family with this id
    Compact(u32),
    /// Checkpoint the store and purge covered WAL segments
    Checkpoint,
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    queued: FxHashSet<Job>,
}

struct Shared {
    queue: Mutex<Queue>,
    work_ready: Condvar,
    shutdown: AtomicBool,
}

pub(crate) struct CompactionScheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl CompactionScheduler {
    /// Spawn `num_threads` workers named `ndb-compact-0`, `ndb-compact-1`, ...
    pub(crate) fn start(num_threads: usize, store: Weak<StoreInner>) -> Result<Self> {
        let scheduler = Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::default()),
                work_ready: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::with_capacity(num_threads)),
        };

        for i in 0..num_threads {
            let shared = Arc::clone(&scheduler.shared);
            let store = store.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("ndb-compact-{}", i))
                .spawn(move || worker_loop(&shared, &store));
            match spawned {
                Ok(handle) => scheduler.workers.lock().push(handle),
                Err(e) => {
                    scheduler.shutdown();
                    return Err(e.into());
                }
            }
        }
        Ok(scheduler)
    }

    /// True if at least one worker thread is running.
    pub(crate) fn has_workers(&self) -> bool {
        !self.workers.lock().is_empty()
    }

    /// Queue `job` unless an identical job is already waiting.
    pub(crate) fn schedule(&self, job: Job) -> bool {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return false;
        }
        {
            let mut queue = self.shared.queue.lock();
            if !queue.queued.insert(job) {
                return false;
            }
            queue.jobs.push_back(job);
        }
        self.shared.work_ready.notify_one();
        true
    }

    /// Stop all workers. Queued jobs are discarded.
    ///
    /// Safe to call from a worker thread; that worker is not joined and exits
    /// once its current job returns.
    pub(crate) fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let mut queue = self.shared.queue.lock();
            queue.jobs.clear();
            queue.queued.clear();
            self.shared.work_ready.notify_all();
        }

        let current = std::thread::current().id();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: &Shared, store: &Weak<StoreInner>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    queue.queued.remove(&job);
                    break job;
                }
                shared.work_ready.wait(&mut queue);
            }
        };

        let inner = match store.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| inner.run_job(job))) {
            error!(
                target: "ndb::compaction",
                job = ?job,
                "background job panicked: {:?}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}
