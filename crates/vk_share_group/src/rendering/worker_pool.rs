//! Background worker pool
//!
//! The pool is owned by whoever creates it and handed to the share group by
//! reference; nothing here is process-global. [`ThreadWorkerPool`] has an
//! explicit lifecycle: [`ThreadWorkerPool::new`] spawns the workers and
//! [`ThreadWorkerPool::drain`] closes the queue and joins them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::backend::error::{VulkanError, VulkanResult};

/// Work item accepted by a [`WorkerPool`]
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of a posted job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Queued, not yet picked up by a worker
    Pending,
    /// Executing on a worker
    Running,
    /// Finished (or abandoned); waiters are released
    Ready,
}

/// Shared completion handle of a posted job
#[derive(Debug, Clone)]
pub struct WaitableEvent {
    inner: Arc<(Mutex<JobState>, Condvar)>,
}

impl WaitableEvent {
    /// Create a pending event
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(JobState::Pending), Condvar::new())),
        }
    }

    /// Create an event that is already ready
    pub fn ready() -> Self {
        let event = Self::new();
        event.mark_ready();
        event
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        // A job never panics while holding the lock, so the state is intact.
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state
    pub fn state(&self) -> JobState {
        *self.lock()
    }

    /// Whether the job has finished
    pub fn is_ready(&self) -> bool {
        self.state() == JobState::Ready
    }

    /// Block until the job has finished
    pub fn wait(&self) {
        let (_, condvar) = &*self.inner;
        let mut state = self.lock();
        while *state != JobState::Ready {
            state = condvar.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Move a pending job to running
    pub fn mark_running(&self) {
        let mut state = self.lock();
        if *state == JobState::Pending {
            *state = JobState::Running;
        }
    }

    /// Finish the job and release every waiter
    pub fn mark_ready(&self) {
        *self.lock() = JobState::Ready;
        self.inner.1.notify_all();
    }

    /// Run `job` on the current thread, driving this event through its states
    ///
    /// The event becomes ready even if `job` panics.
    pub fn run(&self, job: Job) {
        struct ReadyOnDrop<'a>(&'a WaitableEvent);

        impl Drop for ReadyOnDrop<'_> {
            fn drop(&mut self) {
                self.0.mark_ready();
            }
        }

        let _ready = ReadyOnDrop(self);
        self.mark_running();
        job();
    }
}

impl Default for WaitableEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Executor for background work
pub trait WorkerPool {
    /// Queue `job` for execution and return its completion handle
    fn post_worker_task(&self, job: Job) -> VulkanResult<WaitableEvent>;
}

/// Fixed-size pool of worker threads fed by a channel
pub struct ThreadWorkerPool {
    workers: Vec<Worker>,
    sender: Option<Sender<(Job, WaitableEvent)>>,
}

impl ThreadWorkerPool {
    /// Spawn `threads` workers (at least one)
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded();
        let mut pool = Self {
            workers: Vec::with_capacity(threads.max(1)),
            sender: Some(sender),
        };

        for id in 0..threads.max(1) {
            // On failure the pool is dropped, which joins the workers spawned so far.
            pool.workers.push(Worker::new(id, receiver.clone())?);
        }

        log::debug!("Started worker pool with {} threads", pool.workers.len());
        Ok(pool)
    }

    /// Number of worker threads still attached
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool still accepts work
    pub fn is_running(&self) -> bool {
        self.sender.is_some()
    }

    /// Stop accepting work, finish everything queued, and join the workers
    pub fn drain(&mut self) {
        if self.sender.take().is_none() {
            return;
        }

        for worker in self.workers.drain(..) {
            if worker.thread.join().is_err() {
                log::error!("Worker {} terminated abnormally", worker.id);
            }
        }
        log::debug!("Worker pool drained");
    }
}

impl WorkerPool for ThreadWorkerPool {
    fn post_worker_task(&self, job: Job) -> VulkanResult<WaitableEvent> {
        let sender = self.sender.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "worker pool has been drained".to_string(),
        })?;

        let event = WaitableEvent::new();
        sender
            .send((job, event.clone()))
            .map_err(|_| VulkanError::InvalidOperation {
                reason: "worker pool has no live workers".to_string(),
            })?;
        Ok(event)
    }
}

impl Drop for ThreadWorkerPool {
    fn drop(&mut self) {
        self.drain();
    }
}

struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new(id: usize, receiver: Receiver<(Job, WaitableEvent)>) -> std::io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("vk-share-group-worker-{id}"))
            .spawn(move || {
                while let Ok((job, event)) = receiver.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(|| event.run(job))).is_err() {
                        log::error!("Worker {} job panicked", id);
                    }
                }
            })?;

        Ok(Self { id, thread })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_states() {
        let event = WaitableEvent::new();
        assert_eq!(event.state(), JobState::Pending);

        event.mark_running();
        assert_eq!(event.state(), JobState::Running);
        assert!(!event.is_ready());

        event.mark_ready();
        assert!(event.is_ready());
        event.wait();

        // Ready is terminal.
        event.mark_running();
        assert!(event.is_ready());
    }

    #[test]
    fn test_run_marks_ready_on_panic() {
        let event = WaitableEvent::new();
        let clone = event.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| clone.run(Box::new(|| panic!("job failed")))));

        assert!(result.is_err());
        assert!(event.is_ready());
    }

    #[test]
    fn test_thread_pool_runs_jobs() {
        crate::foundation::logging::init_with_level(log::LevelFilter::Debug);
        let pool = ThreadWorkerPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let events: Vec<_> = (0..16)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.post_worker_task(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap()
            })
            .collect();

        for event in &events {
            event.wait();
            assert!(event.is_ready());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_drain_finishes_queued_work_and_rejects_new_work() {
        let mut pool = ThreadWorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            pool.post_worker_task(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        pool.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert!(!pool.is_running());
        assert_eq!(pool.thread_count(), 0);

        let err = pool.post_worker_task(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, VulkanError::InvalidOperation { .. }));

        // Draining twice is harmless.
        pool.drain();
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = ThreadWorkerPool::new(1).unwrap();

        let failed = pool.post_worker_task(Box::new(|| panic!("job failed"))).unwrap();
        failed.wait();

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let ok = pool
            .post_worker_task(Box::new(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        ok.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
