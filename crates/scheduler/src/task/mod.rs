//! The task abstraction the scheduler dispatches.
//!
//! A [`Task`] is a cancelable, restartable unit of work with a priority, a
//! set of opaque dependency tags, blocking predicates and a one-shot result.
//! [`WorkTask`] is the closure-backed implementation most callers build via
//! [`TaskBuilder`].

mod completion;
mod dependencies;
mod outcome;
mod work;

use std::fmt;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lanes_core::Priority;

pub use completion::{AllCompleted, Completion, CompletionSignal};
pub use dependencies::{DependencyTag, TaskDependencies};
pub use outcome::{TaskError, TaskOutcome};
pub use work::{TaskBuilder, TaskContext, TaskHandle, WorkTask};

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Publishes a task's result. Returned by [`Task::execute`] and invoked by the
/// scheduler only after it has finished its own bookkeeping for the task.
pub type Resolver = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work the scheduler can queue, dispatch, cancel and restart.
///
/// Priority, dependencies and the cancelable flag must not change once the
/// task has been scheduled.
pub trait Task: Send + Sync {
    fn id(&self) -> TaskId;

    fn created_at(&self) -> DateTime<Utc>;

    /// Allocation-lane key. Higher values are dequeued first.
    fn priority(&self) -> Priority;

    fn dependencies(&self) -> &TaskDependencies;

    /// Token of the next or current attempt. `None` means the task is not
    /// cancelable.
    fn cancellation_token(&self) -> Option<CancellationToken>;

    fn is_cancelable(&self) -> bool {
        self.cancellation_token().is_some()
    }

    /// Whether `other` must not start while this task is pending or running.
    fn blocks(&self, _other: &dyn Task) -> bool {
        false
    }

    /// Whether this task currently refuses to start.
    fn is_blocked(&self) -> bool {
        false
    }

    /// Run the task body on the calling thread and return the resolver that
    /// publishes its outcome.
    fn execute(&self) -> Resolver;

    /// Signal the completion channel. Idempotent.
    fn complete(&self);

    /// A handle on the completion signal.
    fn completion(&self) -> Completion;

    /// Request cancellation by canceling the token. Publishes nothing: a
    /// dispatched attempt reports `Canceled` through its resolver. No-op for
    /// tasks without a token.
    fn cancel(&self);

    /// Cancel a task the scheduler has removed and will never dispatch again,
    /// publishing `Canceled` right away. No-op for tasks without a token.
    fn cancel_unstarted(&self);

    /// Cancel the running attempt without resolving the result, so the task
    /// can run again. No-op for tasks without a token.
    fn restart(&self);

    fn before_execute(&self) {}

    fn after_execute(&self) {}
}

impl fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .field("cancelable", &self.is_cancelable())
            .finish()
    }
}
