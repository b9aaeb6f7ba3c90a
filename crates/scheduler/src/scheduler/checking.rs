use std::sync::Arc;

use tracing::{debug, trace};

use lanes_core::AllocationMap;

use crate::allocation::{find_allocation_slot, subtract_allocations, take_slot};
use crate::task::Task;

use super::core::{SchedulerState, Shared};

impl Shared {
    /// The admission pass. Runs under the scheduler lock; re-entered from
    /// `schedule`, `unblock`, allocation changes, every attempt's cleanup and
    /// the idle ping.
    pub(super) fn check_tasks_locked(self: &Arc<Self>, state: &mut SchedulerState) {
        let running = state.running.len();
        if running >= state.total_threads {
            return;
        }
        let slots_to_fill = state.total_threads - running;

        // Running and pending tasks both hold a reservation.
        let mut available = subtract_allocations(
            &state.allocation_map,
            state
                .running
                .values()
                .map(|r| r.task.priority())
                .chain(state.pending.iter().map(|t| t.priority())),
        );

        let mut batch: Vec<Arc<dyn Task>> = Vec::new();
        for _ in 0..slots_to_fill {
            let from_pending = state
                .pending
                .iter()
                .position(|task| can_execute(state, task.as_ref()));
            if let Some(task) = from_pending.and_then(|index| state.pending.remove(index)) {
                trace!(task = %task.id(), "Picked pending task");
                batch.push(task);
                continue;
            }

            let popped = self
                .queue
                .pop(|candidate| is_eligible(state, &available, candidate));
            match popped {
                Some(task) => {
                    take_slot(&mut available, task.priority());
                    trace!(task = %task.id(), "Popped queued task");
                    batch.push(task);
                }
                None => break,
            }
        }

        // Tasks in the same batch may conflict with each other.
        for task in batch {
            if can_execute(state, task.as_ref()) {
                self.execute_task(state, task);
            } else {
                debug!(task = %task.id(), "Deferring task to pending");
                state.metrics.deferred += 1;
                state.pending.push_back(task);
            }
        }

        self.ping_if_idle(state);
    }

    /// Nothing running and nothing to unblock: the remaining tasks would wait
    /// forever without an outside trigger, so schedule one.
    fn ping_if_idle(self: &Arc<Self>, state: &mut SchedulerState) {
        if !state.running.is_empty() || !state.blockers.is_empty() {
            return;
        }
        if state.pending.is_empty() && !self.queue.has_tasks() {
            return;
        }
        if state.ping_outstanding {
            return;
        }

        state.ping_outstanding = true;
        state.metrics.pings += 1;
        debug!(
            pending = state.pending.len(),
            queued = self.queue.len(),
            "Idle with waiting tasks, scheduling ping"
        );

        let weak = Arc::downgrade(self);
        let interval = self.ping_interval;
        self.executor.execute(Box::new(move || {
            std::thread::sleep(interval);
            if let Some(shared) = weak.upgrade() {
                let mut state = shared.state.lock();
                state.ping_outstanding = false;
                shared.check_tasks_locked(&mut state);
            }
        }));
    }
}

fn blocked_externally(state: &SchedulerState, task: &dyn Task) -> bool {
    state.restarting.contains(&task.id())
        || state.blockers.iter().any(|blocker| blocker.is_blocked(task))
        || task.is_blocked()
}

/// Narrow check for a task that already holds a reservation: blockers,
/// running tasks' blocking predicates and the task's own predicate.
pub(super) fn can_execute(state: &SchedulerState, task: &dyn Task) -> bool {
    !blocked_externally(state, task)
        && !state.running.values().any(|r| r.task.blocks(task))
}

/// Full check for a queued candidate: a free slot in its lane, plus no
/// pending or running task, blocker or self-predicate holding it back.
fn is_eligible(state: &SchedulerState, available: &AllocationMap, task: &dyn Task) -> bool {
    find_allocation_slot(available, task.priority()).is_some()
        && !blocked_externally(state, task)
        && !state.pending.iter().any(|p| p.blocks(task))
        && !state.running.values().any(|r| r.task.blocks(task))
}
