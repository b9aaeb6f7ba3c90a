//! Executor capability injected into the scheduler.
//!
//! The scheduler never creates threads. It hands closures to an
//! [`Executor`] and bounds how many of them are in flight.

use std::sync::Arc;

use tokio::runtime::Handle;

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs on some other thread.
///
/// Implementations must not run the job inline on the submitting thread:
/// the scheduler submits while holding its lock, and jobs take that lock.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Executor backed by a `rayon` thread pool.
pub struct RayonExecutor {
    pool: Arc<rayon::ThreadPool>,
}

impl RayonExecutor {
    /// Build a dedicated pool with `threads` workers.
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("lanes-worker-{i}"))
            .build()?;
        Ok(Self { pool: Arc::new(pool) })
    }

    /// Share an existing pool.
    pub fn from_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        Self { pool }
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Executor for RayonExecutor {
    fn execute(&self, job: Job) {
        self.pool.spawn(job);
    }
}

/// Executor that runs jobs on a tokio runtime's blocking pool.
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is currently inside.
    pub fn current() -> Self {
        Self { handle: Handle::current() }
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) {
        // Task bodies block; keep them off the async worker threads.
        drop(self.handle.spawn_blocking(job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn rayon_runs_job_on_pool_thread() {
        let executor = RayonExecutor::new(2).unwrap();
        assert_eq!(executor.threads(), 2);
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();
        executor.execute(Box::new(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));
        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tokio_runs_job_on_blocking_pool() {
        let executor = TokioExecutor::current();
        let (tx, rx) = tokio::sync::oneshot::channel();
        executor.execute(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }
}
