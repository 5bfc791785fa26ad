//! Fixed-size worker pool for batched per-line work.
//!
//! # Architecture
//!
//! - One FIFO job queue and one in-flight ID set, guarded by a single
//!   mutex + condvar. The lock is held only around queue bookkeeping;
//!   job bodies run unlocked.
//! - [`WorkerPool::submit`] allocates a fresh, monotonically increasing
//!   [`JobId`] and wakes one worker. [`WorkerPool::wait`] blocks until
//!   the ID leaves the in-flight set.
//! - [`WorkerPool::for_each`] partitions a slice into contiguous batches
//!   (the last one may be short), submits one job per batch, and waits
//!   for all of them. Elements are not synchronized: the callback must
//!   tolerate concurrent invocation on *distinct* elements only.
//!
//! # Correctness Invariants
//!
//! - **Exactly-once**: every submitted job runs once; start order is
//!   unspecified.
//! - **No starvation under nesting**: a thread waiting on a job drains
//!   the queue itself instead of blocking, so a job that submits and
//!   waits on sub-jobs (batched passes from inside a pool job) completes
//!   even on a one-thread pool.
//! - **Drop drains**: dropping the pool stops intake, lets queued jobs
//!   finish, and joins every worker.
//! - **Fail fast, retire first**: a panicking job poisons the pool.
//!   Still-queued jobs are discarded (and leave the in-flight set);
//!   jobs already running are allowed to finish. `wait`/`wait_all`
//!   propagate the panic only after every waited ID has retired, so a
//!   caller that submitted borrowing jobs never unwinds while one of
//!   them is still executing.

use ahash::AHashSet;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Handle to a submitted job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(u64);

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedJob {
    id: JobId,
    func: Job,
}

struct State {
    queue: VecDeque<QueuedJob>,
    in_flight: AHashSet<u64>,
    next_id: u64,
    stop: bool,
    poisoned: bool,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("worker pool mutex poisoned")
    }
}

/// Process-wide thread-count override; `0` = hardware parallelism.
static MAX_THREADS: AtomicUsize = AtomicUsize::new(0);

/// A fixed-size pool of worker threads.
pub struct WorkerPool {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns a pool with `threads` workers; `0` means the process-wide
    /// default (see [`WorkerPool::set_max_threads`]).
    pub fn new(threads: usize) -> WorkerPool {
        let count = if threads == 0 {
            Self::default_threads()
        } else {
            threads
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                in_flight: AHashSet::new(),
                next_id: 0,
                stop: false,
                poisoned: false,
            }),
            cond: Condvar::new(),
        });
        let threads = (0..count)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || Self::worker_loop(&shared))
            })
            .collect();
        WorkerPool { shared, threads }
    }

    /// Overrides the default worker count for pools created with `0`.
    pub fn set_max_threads(threads: usize) {
        MAX_THREADS.store(threads, Ordering::Relaxed);
    }

    fn default_threads() -> usize {
        let cap = MAX_THREADS.load(Ordering::Relaxed);
        if cap != 0 {
            return cap;
        }
        thread::available_parallelism().map_or(1, |n| n.get())
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads.len()
    }

    /// Enqueues a job and wakes one worker.
    pub fn submit<F>(&self, func: F) -> JobId
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(func))
    }

    /// Enqueues a job that borrows from the caller's stack.
    ///
    /// # Safety
    ///
    /// The caller must wait for the returned ID (or for pool teardown)
    /// before anything the job borrows goes out of scope.
    pub(crate) unsafe fn submit_scoped<'scope>(
        &self,
        func: Box<dyn FnOnce() + Send + 'scope>,
    ) -> JobId {
        // SAFETY: lifetime erasure only; the caller keeps the borrows
        // alive until the job is waited on.
        let func: Job = unsafe { std::mem::transmute(func) };
        self.enqueue(func)
    }

    fn enqueue(&self, func: Job) -> JobId {
        let mut state = self.shared.lock();
        state.next_id += 1;
        let id = JobId(state.next_id);
        state.in_flight.insert(id.0);
        state.queue.push_back(QueuedJob { id, func });
        drop(state);
        self.shared.cond.notify_one();
        id
    }

    /// Blocks until `id` has retired (completed or been discarded by a
    /// pool poison).
    ///
    /// While waiting, this thread drains queued jobs itself; see the
    /// module docs.
    ///
    /// # Panics
    ///
    /// Panics if any pool job panicked, but only after `id` has
    /// retired.
    pub fn wait(&self, id: JobId) {
        self.await_retired(id);
        self.check_poison();
    }

    /// Blocks until every listed job has retired.
    ///
    /// # Panics
    ///
    /// Panics if any pool job panicked, but only after *all* listed
    /// IDs have retired.
    pub fn wait_all(&self, ids: &[JobId]) {
        for &id in ids {
            self.await_retired(id);
        }
        self.check_poison();
    }

    /// Waits for `id` to leave the in-flight set without propagating a
    /// poison. Scoped submitters rely on this: their borrows stay valid
    /// until the waited jobs can no longer run.
    fn await_retired(&self, id: JobId) {
        let shared = &self.shared;
        let mut state = shared.lock();
        loop {
            if !state.in_flight.contains(&id.0) {
                return;
            }
            if state.poisoned {
                // Nothing new may start; discard whatever is still
                // queued and wait out the jobs already running.
                while let Some(pending) = state.queue.pop_front() {
                    state.in_flight.remove(&pending.id.0);
                }
                if !state.in_flight.contains(&id.0) {
                    return;
                }
                state = shared
                    .cond
                    .wait(state)
                    .expect("worker pool mutex poisoned");
            } else if let Some(job) = state.queue.pop_front() {
                drop(state);
                Self::run_job(shared, job);
                state = shared.lock();
            } else {
                state = shared
                    .cond
                    .wait(state)
                    .expect("worker pool mutex poisoned");
            }
        }
    }

    fn check_poison(&self) {
        let state = self.shared.lock();
        assert!(!state.poisoned, "a worker pool job panicked");
    }

    /// Applies `func` to every element of `items`, in contiguous batches
    /// of `batch_size`, across the pool. Returns when all batches are
    /// done.
    ///
    /// Access to the elements is not synchronized; `func` runs
    /// concurrently on distinct elements only.
    ///
    /// # Panics
    ///
    /// Panics when `batch_size` is zero or a batch job panicked.
    pub fn for_each<T, F>(&self, items: &mut [T], batch_size: usize, func: F)
    where
        T: Send,
        F: Fn(&mut T) + Send + Sync,
    {
        assert!(batch_size > 0, "batch_size must be > 0");
        if items.is_empty() {
            return;
        }
        let func = &func;
        let mut jobs = Vec::with_capacity(items.len() / batch_size + 1);
        for batch in items.chunks_mut(batch_size) {
            let job: Box<dyn FnOnce() + Send + '_> = Box::new(move || {
                for item in batch.iter_mut() {
                    func(item);
                }
            });
            // SAFETY: `wait_all` below blocks until every batch job has
            // completed, so the borrows of `items` and `func` outlive
            // the jobs.
            jobs.push(unsafe { self.submit_scoped(job) });
        }
        self.wait_all(&jobs);
    }

    fn worker_loop(shared: &Shared) {
        loop {
            let job = {
                let mut state = shared.lock();
                loop {
                    if let Some(job) = state.queue.pop_front() {
                        break job;
                    }
                    if state.stop {
                        return;
                    }
                    state = shared
                        .cond
                        .wait(state)
                        .expect("worker pool mutex poisoned");
                }
            };
            Self::run_job(shared, job);
        }
    }

    /// Runs one job unlocked, then retires its ID.
    fn run_job(shared: &Shared, job: QueuedJob) {
        let func = job.func;
        let outcome = panic::catch_unwind(AssertUnwindSafe(func));
        let mut state = shared.lock();
        state.in_flight.remove(&job.id.0);
        if outcome.is_err() {
            // Fail fast: discard pending work so nothing runs after a
            // poisoned pass. Discarded jobs retire immediately so
            // waiters are not left hanging on IDs that will never run.
            state.poisoned = true;
            state.stop = true;
            while let Some(pending) = state.queue.pop_front() {
                state.in_flight.remove(&pending.id.0);
            }
        }
        drop(state);
        shared.cond.notify_all();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.stop = true;
        }
        self.shared.cond.notify_all();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}
