//! Facade owning the executor and scheduler lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use lanes_core::LanesConfig;

use crate::blocker::{BlockAll, Blocker};
use crate::executor::{Executor, RayonExecutor};
use crate::predicates;
use crate::queue::TaskQueue;
use crate::scheduler::Scheduler;
use crate::task::{TaskBuilder, TaskHandle};

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("shutdown timed out after {timeout:?} with {running} tasks still running")]
    ShutdownTimeout { timeout: Duration, running: usize },
}

/// Owns an executor and the scheduler driving it.
pub struct TasksManager {
    scheduler: Scheduler,
    shutdown_timeout: Duration,
    shut_down: AtomicBool,
}

impl TasksManager {
    /// Build a rayon-backed manager from config.
    pub fn new(config: &LanesConfig) -> Result<Self, ManagerError> {
        let executor = RayonExecutor::new(config.resolved_worker_threads())?;
        info!("Tasks manager starting with {} workers", executor.threads());
        Ok(Self::with_executor(Arc::new(executor), config))
    }

    /// Use a caller-provided executor.
    pub fn with_executor(executor: Arc<dyn Executor>, config: &LanesConfig) -> Self {
        let scheduler = Scheduler::with_queue(
            executor,
            Arc::new(TaskQueue::new()),
            config.allocation_map(),
            Duration::from_millis(config.ping_interval_ms),
        );
        Self {
            scheduler,
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Build and schedule a task.
    pub fn schedule<T: Send + 'static>(&self, builder: TaskBuilder<T>) -> TaskHandle<T> {
        self.scheduler.submit(builder)
    }

    /// Stop dispatching, cancel everything cancelable and wait for running
    /// tasks to drain. Tasks without a token that are still queued are left
    /// where they are and never start.
    pub fn shutdown(&self) -> Result<(), ManagerError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Tasks manager shutting down");

        let block_all: Arc<dyn Blocker> = Arc::new(BlockAll);
        self.scheduler.block(block_all);
        let canceled = self.scheduler.cancel(predicates::any());
        info!("Shutdown canceled {} tasks", canceled.len());

        let deadline = Instant::now() + self.shutdown_timeout;
        loop {
            let running = self.scheduler.running_count();
            if running == 0 {
                info!("Tasks manager stopped");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ManagerError::ShutdownTimeout { timeout: self.shutdown_timeout, running });
            }
            std::thread::sleep(SHUTDOWN_POLL);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Drop for TasksManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Tasks manager dropped uncleanly: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskError, TaskOutcome};
    use lanes_core::LaneConfig;

    fn config() -> LanesConfig {
        LanesConfig {
            lanes: vec![LaneConfig { threshold: 100, slots: 2 }],
            worker_threads: 0,
            ping_interval_ms: 20,
            shutdown_timeout_ms: 2000,
        }
    }

    #[test]
    fn schedules_and_resolves() {
        let manager = TasksManager::new(&config()).unwrap();
        assert_eq!(manager.scheduler().total_threads(), 2);
        let handle = manager.schedule(TaskBuilder::new(10, |_| Ok("done")));
        assert_eq!(handle.blocking_outcome(), TaskOutcome::Success("done"));
        manager.shutdown().unwrap();
        assert!(manager.is_shut_down());
    }

    #[test]
    fn shutdown_cancels_cooperative_tasks() {
        let manager = TasksManager::new(&config()).unwrap();
        let handle = manager.schedule(
            TaskBuilder::<()>::new(10, |ctx| loop {
                ctx.check_canceled()?;
                std::thread::sleep(Duration::from_millis(5));
            })
            .cancelable(),
        );
        // Make sure it is actually running before shutting down.
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.scheduler().running_count() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        manager.shutdown().unwrap();
        assert_eq!(handle.blocking_outcome(), TaskOutcome::Canceled);
        // Second call is a no-op.
        manager.shutdown().unwrap();
    }

    #[test]
    fn shutdown_times_out_on_stubborn_task() {
        let mut cfg = config();
        cfg.shutdown_timeout_ms = 50;
        let manager = TasksManager::new(&cfg).unwrap();
        let _handle = manager.schedule(TaskBuilder::<()>::new(10, |_| {
            std::thread::sleep(Duration::from_millis(400));
            Err(TaskError::execution("late"))
        }));
        while manager.scheduler().running_count() == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
        let err = manager.shutdown().unwrap_err();
        assert!(matches!(err, ManagerError::ShutdownTimeout { running: 1, .. }));
    }
}
