use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lanes_core::Priority;

use super::completion::{Completion, CompletionSignal};
use super::dependencies::{DependencyTag, TaskDependencies};
use super::outcome::{TaskError, TaskOutcome};
use super::{Resolver, Task, TaskId};

type Body<T> = dyn Fn(&TaskContext) -> Result<T, TaskError> + Send + Sync;
type BlocksOthers = dyn Fn(&dyn Task) -> bool + Send + Sync;
type BlockedWhile = dyn Fn() -> bool + Send + Sync;
type Hook = dyn Fn(TaskId) + Send + Sync;

/// What a task body sees while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    attempt: u32,
    token: Option<CancellationToken>,
}

impl TaskContext {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// 1 for the first run, incremented on every restart.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    pub fn is_canceled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// `Err(TaskError::Canceled)` once cancellation has been requested.
    /// Bodies call this at safe points.
    pub fn check_canceled(&self) -> Result<(), TaskError> {
        if self.is_canceled() {
            Err(TaskError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Per-attempt control state, behind one lock so that publishing, deferring
/// to a rerun and canceling never interleave.
struct Control<T> {
    /// `None` for tasks that cannot be canceled.
    token: Option<CancellationToken>,
    result: Option<oneshot::Sender<TaskOutcome<T>>>,
    executing: bool,
    restart_requested: bool,
    cancel_requested: bool,
}

/// Closure-backed [`Task`].
pub struct WorkTask<T> {
    id: TaskId,
    created_at: DateTime<Utc>,
    priority: Priority,
    dependencies: TaskDependencies,
    body: Box<Body<T>>,
    blocks_others: Option<Box<BlocksOthers>>,
    blocked_while: Option<Box<BlockedWhile>>,
    before: Option<Box<Hook>>,
    after: Option<Box<Hook>>,
    control: Mutex<Control<T>>,
    completion: CompletionSignal,
    attempts: AtomicU32,
}

type Publish<T> = (oneshot::Sender<TaskOutcome<T>>, TaskOutcome<T>);

impl<T: Send + 'static> WorkTask<T> {
    /// Number of times the body has been entered.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_executing(&self) -> bool {
        self.control.lock().executing
    }

    fn run_body(&self, ctx: &TaskContext) -> Result<T, TaskError> {
        if ctx.is_canceled() {
            return Err(TaskError::Canceled);
        }
        match panic::catch_unwind(AssertUnwindSafe(|| (self.body)(ctx))) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// End the attempt and decide what it publishes. `None` when the attempt
    /// was restarted (the result stays unresolved for the rerun) or the
    /// result has already been published.
    fn settle(&self, raw: Result<T, TaskError>, token: Option<&CancellationToken>) -> Option<Publish<T>> {
        let mut control = self.control.lock();
        control.executing = false;

        if control.restart_requested && !control.cancel_requested {
            debug!(task = %self.id, "Attempt exited for restart, result left unresolved");
            control.token = Some(CancellationToken::new());
            control.restart_requested = false;
            return None;
        }
        let tx = control.result.take()?;
        drop(control);

        let canceled = token.is_some_and(CancellationToken::is_cancelled);
        let outcome = match raw {
            Ok(value) => TaskOutcome::Success(value),
            Err(TaskError::Canceled) => TaskOutcome::Canceled,
            Err(TaskError::Interrupted(_)) if canceled => TaskOutcome::Canceled,
            Err(err) => {
                warn!(task = %self.id, error = %err, "Task body failed");
                TaskOutcome::Failed(err)
            }
        };
        Some((tx, outcome))
    }
}

impl<T: Send + 'static> Task for WorkTask<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn dependencies(&self) -> &TaskDependencies {
        &self.dependencies
    }

    fn cancellation_token(&self) -> Option<CancellationToken> {
        self.control.lock().token.clone()
    }

    fn blocks(&self, other: &dyn Task) -> bool {
        other.id() != self.id && self.blocks_others.as_ref().is_some_and(|f| f(other))
    }

    fn is_blocked(&self) -> bool {
        self.blocked_while.as_ref().is_some_and(|f| f())
    }

    fn execute(&self) -> Resolver {
        let token = {
            let mut control = self.control.lock();
            control.executing = true;
            control.token.clone()
        };
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let ctx = TaskContext { id: self.id, attempt, token: token.clone() };
        let raw = self.run_body(&ctx);

        match self.settle(raw, token.as_ref()) {
            Some((tx, outcome)) => Box::new(move || {
                let _ = tx.send(outcome);
            }),
            None => Box::new(|| {}),
        }
    }

    fn complete(&self) {
        self.completion.complete();
    }

    fn completion(&self) -> Completion {
        self.completion.subscribe()
    }

    fn cancel(&self) {
        let mut control = self.control.lock();
        let Some(token) = control.token.clone() else {
            return;
        };
        control.cancel_requested = true;
        token.cancel();
    }

    fn cancel_unstarted(&self) {
        let tx = {
            let mut control = self.control.lock();
            let Some(token) = control.token.clone() else {
                return;
            };
            control.cancel_requested = true;
            token.cancel();
            control.result.take()
        };
        if let Some(tx) = tx {
            let _ = tx.send(TaskOutcome::Canceled);
        }
    }

    fn restart(&self) {
        let mut control = self.control.lock();
        let Some(token) = control.token.clone() else {
            return;
        };
        control.restart_requested = true;
        token.cancel();
    }

    fn before_execute(&self) {
        if let Some(hook) = &self.before {
            hook(self.id);
        }
    }

    fn after_execute(&self) {
        if let Some(hook) = &self.after {
            hook(self.id);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Caller's side of a task: awaits the published outcome.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    result: oneshot::Receiver<TaskOutcome<T>>,
    completion: Completion,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Wait for the outcome. A task dropped without resolving reports `Canceled`.
    pub async fn outcome(self) -> TaskOutcome<T> {
        self.result.await.unwrap_or(TaskOutcome::Canceled)
    }

    /// Blocking variant of [`outcome`](Self::outcome). Must not be called
    /// from inside an async runtime.
    pub fn blocking_outcome(self) -> TaskOutcome<T> {
        self.result.blocking_recv().unwrap_or(TaskOutcome::Canceled)
    }

    /// The outcome if it has already been published.
    pub fn try_outcome(&mut self) -> Option<TaskOutcome<T>> {
        self.result.try_recv().ok()
    }
}

/// Builds a [`WorkTask`] and its [`TaskHandle`].
pub struct TaskBuilder<T> {
    priority: Priority,
    body: Box<Body<T>>,
    cancelable: bool,
    dependencies: TaskDependencies,
    blocks_others: Option<Box<BlocksOthers>>,
    blocked_while: Option<Box<BlockedWhile>>,
    before: Option<Box<Hook>>,
    after: Option<Box<Hook>>,
}

impl<T: Send + 'static> TaskBuilder<T> {
    /// The body may run more than once if the task is restarted.
    pub fn new<F>(priority: Priority, body: F) -> Self
    where
        F: Fn(&TaskContext) -> Result<T, TaskError> + Send + Sync + 'static,
    {
        Self {
            priority,
            body: Box::new(body),
            cancelable: false,
            dependencies: TaskDependencies::new(),
            blocks_others: None,
            blocked_while: None,
            before: None,
            after: None,
        }
    }

    /// Give the task a cancellation token.
    pub fn cancelable(mut self) -> Self {
        self.cancelable = true;
        self
    }

    pub fn depends_on(mut self, tag: DependencyTag) -> Self {
        self.dependencies.insert(tag);
        self
    }

    /// Keep matching tasks from starting while this one is pending or running.
    pub fn blocks_others<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Task) -> bool + Send + Sync + 'static,
    {
        self.blocks_others = Some(Box::new(predicate));
        self
    }

    /// Refuse to start while `predicate` holds.
    pub fn blocked_while<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.blocked_while = Some(Box::new(predicate));
        self
    }

    pub fn on_before_execute<F>(mut self, hook: F) -> Self
    where
        F: Fn(TaskId) + Send + Sync + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn on_after_execute<F>(mut self, hook: F) -> Self
    where
        F: Fn(TaskId) + Send + Sync + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> (Arc<WorkTask<T>>, TaskHandle<T>) {
        let id = TaskId::new();
        let (tx, rx) = oneshot::channel();
        let completion = CompletionSignal::new();
        let handle = TaskHandle { id, result: rx, completion: completion.subscribe() };

        let task = WorkTask {
            id,
            created_at: Utc::now(),
            priority: self.priority,
            dependencies: self.dependencies,
            body: self.body,
            blocks_others: self.blocks_others,
            blocked_while: self.blocked_while,
            before: self.before,
            after: self.after,
            control: Mutex::new(Control {
                token: self.cancelable.then(CancellationToken::new),
                result: Some(tx),
                executing: false,
                restart_requested: false,
                cancel_requested: false,
            }),
            completion,
            attempts: AtomicU32::new(0),
        };
        (Arc::new(task), handle)
    }
}
