//! Tiered-lane scheduler for cancelable, restartable background tasks.
//!
//! Tasks are queued by priority, admitted against a threshold → slot
//! allocation map, and handed to an injected [`Executor`]. Cancellation is
//! cooperative through per-task tokens; restart reruns a task without
//! resolving its result in between.

pub mod allocation;
pub mod blocker;
pub mod executor;
pub mod manager;
pub mod metrics;
pub mod predicates;
pub mod queue;
pub mod scheduler;
pub mod task;

pub use allocation::{compute_threads_count, find_allocation_slot, subtract_allocations};
pub use blocker::{BlockAll, Blocker, PredicateBlocker};
pub use executor::{Executor, Job, RayonExecutor, TokioExecutor};
pub use manager::{ManagerError, TasksManager};
pub use metrics::SchedulerMetrics;
pub use predicates::TaskPredicate;
pub use queue::TaskQueue;
pub use scheduler::{BulkResult, Scheduler, DEFAULT_PING_INTERVAL};
pub use task::{
    AllCompleted, Completion, CompletionSignal, DependencyTag, Resolver, Task, TaskBuilder,
    TaskContext, TaskDependencies, TaskError, TaskHandle, TaskId, TaskOutcome, WorkTask,
};

pub use lanes_core::{AllocationMap, Priority};
