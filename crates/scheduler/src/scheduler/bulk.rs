use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::task::{AllCompleted, Task};

use super::Scheduler;

/// Tasks matched by a bulk operation and a future over their completion.
///
/// Matching is best-effort reporting: tasks without a cancellation token are
/// included even though the operation could not touch them.
pub struct BulkResult {
    pub tasks: Vec<Arc<dyn Task>>,
    pub completion: AllCompleted,
}

impl BulkResult {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for BulkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkResult").field("tasks", &self.tasks).finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Cancel every queued, pending or running task matching `predicate`.
    ///
    /// Queued and pending cancelable matches are removed, completed and
    /// resolved `Canceled` before this returns. Running ones only have their
    /// token canceled; their attempt publishes the outcome after cleanup.
    /// The returned completion resolves once every match has completed.
    pub fn cancel<F>(&self, predicate: F) -> BulkResult
    where
        F: Fn(&dyn Task) -> bool,
    {
        let shared = &self.shared;
        let mut state = shared.state.lock();

        let mut matched = shared.queue.cancel(&predicate);
        let mut canceled = matched.iter().filter(|t| t.is_cancelable()).count() as u64;

        let pending = std::mem::take(&mut state.pending);
        for task in pending {
            if predicate(task.as_ref()) {
                matched.push(Arc::clone(&task));
                if task.is_cancelable() {
                    debug!(task = %task.id(), "Canceling pending task");
                    task.complete();
                    task.cancel_unstarted();
                    canceled += 1;
                    continue;
                }
            }
            state.pending.push_back(task);
        }

        for running in state.running.values() {
            let task = &running.task;
            if predicate(task.as_ref()) {
                matched.push(Arc::clone(task));
                if task.is_cancelable() {
                    debug!(task = %task.id(), "Canceling running task");
                    task.cancel();
                    canceled += 1;
                }
            }
        }

        state.metrics.canceled += canceled;
        let completion = AllCompleted::new(matched.iter().map(|t| t.completion()).collect());

        // Dropped pending tasks free their reservations.
        shared.check_tasks_locked(&mut state);

        BulkResult { tasks: matched, completion }
    }

    /// Restart every running task matching `predicate`.
    ///
    /// Cancelable matches have their current attempt canceled without
    /// resolving their result and move to the pending list; they run again
    /// once that attempt has exited. The completion covers the exit of the
    /// canceled attempts, not the reruns.
    pub fn restart<F>(&self, predicate: F) -> BulkResult
    where
        F: Fn(&dyn Task) -> bool,
    {
        let shared = &self.shared;
        let mut state = shared.state.lock();

        let dispatches: Vec<_> = state
            .running
            .iter()
            .filter(|(_, r)| predicate(r.task.as_ref()))
            .map(|(dispatch, _)| *dispatch)
            .collect();

        let mut matched = Vec::with_capacity(dispatches.len());
        let mut attempts = Vec::new();
        for dispatch in dispatches {
            let Some(running) = state.running.get(&dispatch) else {
                continue;
            };
            let task = Arc::clone(&running.task);
            matched.push(Arc::clone(&task));
            if !task.is_cancelable() {
                continue;
            }
            if let Some(running) = state.running.remove(&dispatch) {
                debug!(task = %task.id(), "Restarting running task");
                attempts.push(running.attempt_done.subscribe());
                task.restart();
                state.restarting.insert(task.id());
                state.pending.push_back(task);
                state.metrics.restarted += 1;
            }
        }

        shared.check_tasks_locked(&mut state);

        BulkResult { tasks: matched, completion: AllCompleted::new(attempts) }
    }

    /// Future resolving once every task matching `predicate` right now
    /// (queued, pending or running) has completed.
    pub fn all_tasks_completion<F>(&self, predicate: F) -> AllCompleted
    where
        F: Fn(&dyn Task) -> bool,
    {
        let state = self.shared.state.lock();
        let mut completions: Vec<_> = state
            .running
            .values()
            .map(|r| &r.task)
            .chain(state.pending.iter())
            .filter(|t| predicate(t.as_ref()))
            .map(|t| t.completion())
            .collect();
        completions.extend(self.shared.queue.get(&predicate).iter().map(|t| t.completion()));
        AllCompleted::new(completions)
    }
}
