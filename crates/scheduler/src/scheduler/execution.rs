use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::MutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span};

use crate::task::{CompletionSignal, Task};

use super::core::{DispatchId, Running, SchedulerState, Shared};

impl Shared {
    /// Move a task into the running set and hand it to the executor.
    pub(super) fn execute_task(self: &Arc<Self>, state: &mut SchedulerState, task: Arc<dyn Task>) {
        let dispatch = state.next_dispatch;
        state.next_dispatch += 1;

        let attempt_done = Arc::new(CompletionSignal::new());
        state.running.insert(
            dispatch,
            Running { task: Arc::clone(&task), attempt_done: Arc::clone(&attempt_done) },
        );
        state.metrics.dispatched += 1;
        debug!(
            task = %task.id(),
            priority = task.priority(),
            running = state.running.len(),
            "Dispatching task"
        );

        let token = task.cancellation_token();
        let shared = Arc::clone(self);
        self.executor.execute(Box::new(move || {
            let id = task.id();
            let run = AssertUnwindSafe(|| shared.run_dispatched(dispatch, task, attempt_done, token));
            if panic::catch_unwind(run).is_err() {
                error!(task = %id, "Task execution panicked outside its body");
            }
        }));
    }

    /// Executor side of a dispatch.
    fn run_dispatched(
        self: &Arc<Self>,
        dispatch: DispatchId,
        task: Arc<dyn Task>,
        attempt_done: Arc<CompletionSignal>,
        token: Option<CancellationToken>,
    ) {
        let span = info_span!("task", id = %task.id(), priority = task.priority());
        let _entered = span.enter();

        // Declared before the lock guard so an unwinding drop runs after the
        // lock has been released.
        let guard = AttemptGuard {
            shared: Arc::clone(self),
            dispatch,
            task: Arc::clone(&task),
            attempt_done,
            started: Instant::now(),
            armed: true,
        };

        let mut state = self.state.lock();
        let canceled_early = token.as_ref().is_some_and(CancellationToken::is_cancelled);
        if canceled_early {
            debug!("Token canceled before start, skipping body");
        } else {
            task.before_execute();
        }

        let resolver = MutexGuard::unlocked(&mut state, || task.execute());

        if !canceled_early {
            task.after_execute();
        }

        guard.release(&mut state);
        drop(state);

        // Published only once the scheduler state reflects this attempt's end.
        resolver();
    }

    /// Bookkeeping shared by the normal and unwinding exits of an attempt.
    fn finish_attempt(
        &self,
        state: &mut SchedulerState,
        dispatch: DispatchId,
        task: &Arc<dyn Task>,
        attempt_done: &CompletionSignal,
        elapsed: Duration,
    ) {
        let still_running = state.running.remove(&dispatch).is_some();
        state.metrics.record_execution(task.priority(), elapsed);

        if still_running {
            task.complete();
            debug!(running = state.running.len(), ?elapsed, "Task completed");
        } else {
            // Restarted: the task already sits in pending and will run again.
            state.restarting.remove(&task.id());
            debug!(?elapsed, "Restarted attempt exited");
        }
        attempt_done.complete();
    }

    /// Run an admission pass later on the executor rather than on this thread.
    fn recheck_later(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.executor.execute(Box::new(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let recheck = AssertUnwindSafe(|| {
                let mut state = shared.state.lock();
                shared.check_tasks_locked(&mut state);
            });
            if panic::catch_unwind(recheck).is_err() {
                error!("Deferred admission pass panicked");
            }
        }));
    }
}

/// Scope guard tying an attempt's cleanup to every exit path.
struct AttemptGuard {
    shared: Arc<Shared>,
    dispatch: DispatchId,
    task: Arc<dyn Task>,
    attempt_done: Arc<CompletionSignal>,
    started: Instant,
    armed: bool,
}

impl AttemptGuard {
    /// Run the cleanup now, with the scheduler lock already held.
    fn release(mut self, state: &mut SchedulerState) {
        self.armed = false;
        self.shared.finish_attempt(
            state,
            self.dispatch,
            &self.task,
            &self.attempt_done,
            self.started.elapsed(),
        );
        self.shared.check_tasks_locked(state);
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!(task = %self.task.id(), "Attempt unwound, releasing its slot");
        {
            let mut state = self.shared.state.lock();
            self.shared.finish_attempt(
                &mut state,
                self.dispatch,
                &self.task,
                &self.attempt_done,
                self.started.elapsed(),
            );
        }
        // Blockers and predicates run during admission; a panic from one of
        // them here, mid-unwind, would abort the process.
        self.shared.recheck_later();
    }
}
