use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use lanes_core::AllocationMap;

use crate::allocation::compute_threads_count;
use crate::blocker::{same_blocker, Blocker};
use crate::executor::Executor;
use crate::metrics::SchedulerMetrics;
use crate::queue::TaskQueue;
use crate::task::{CompletionSignal, Task, TaskBuilder, TaskHandle, TaskId};

/// Delay of the idle re-evaluation ping.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(500);

/// Serial assigned to every dispatch, keying the running set.
pub(super) type DispatchId = u64;

/// A dispatched attempt.
pub(super) struct Running {
    pub(super) task: Arc<dyn Task>,
    /// Fires when this attempt's job has exited, restarted or not.
    pub(super) attempt_done: Arc<CompletionSignal>,
}

/// Everything guarded by the scheduler lock.
pub(super) struct SchedulerState {
    pub(super) allocation_map: AllocationMap,
    pub(super) total_threads: usize,
    pub(super) running: BTreeMap<DispatchId, Running>,
    /// Tasks selected for execution but deferred; each keeps its slot reservation.
    pub(super) pending: VecDeque<Arc<dyn Task>>,
    pub(super) blockers: Vec<Arc<dyn Blocker>>,
    /// Restarted tasks whose previous attempt has not exited yet.
    pub(super) restarting: HashSet<TaskId>,
    pub(super) next_dispatch: DispatchId,
    pub(super) ping_outstanding: bool,
    pub(super) metrics: SchedulerMetrics,
}

pub(super) struct Shared {
    pub(super) state: Mutex<SchedulerState>,
    pub(super) queue: Arc<TaskQueue>,
    pub(super) executor: Arc<dyn Executor>,
    pub(super) ping_interval: Duration,
}

/// Decides which queued tasks run, bounded per priority lane, and drives
/// them through an injected [`Executor`].
///
/// Cheap to clone; all clones share the same state. Predicates and blockers
/// are evaluated under the scheduler lock and must not call back into it.
#[derive(Clone)]
pub struct Scheduler {
    pub(super) shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a scheduler with its own queue and the default ping interval.
    pub fn new(executor: Arc<dyn Executor>, allocations: AllocationMap) -> Self {
        Self::with_queue(executor, Arc::new(TaskQueue::new()), allocations, DEFAULT_PING_INTERVAL)
    }

    pub fn with_queue(
        executor: Arc<dyn Executor>,
        queue: Arc<TaskQueue>,
        allocations: AllocationMap,
        ping_interval: Duration,
    ) -> Self {
        let total_threads = compute_threads_count(&allocations);
        info!(
            "Scheduler created with {} lanes, {} total slots",
            allocations.len(),
            total_threads
        );
        let state = SchedulerState {
            allocation_map: allocations,
            total_threads,
            running: BTreeMap::new(),
            pending: VecDeque::new(),
            blockers: Vec::new(),
            restarting: HashSet::new(),
            next_dispatch: 0,
            ping_outstanding: false,
            metrics: SchedulerMetrics::default(),
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                queue,
                executor,
                ping_interval,
            }),
        }
    }

    /// Queue a task and immediately try to dispatch.
    pub fn schedule(&self, task: Arc<dyn Task>) {
        let mut state = self.shared.state.lock();
        debug!(task = %task.id(), priority = task.priority(), "Scheduling task");
        state.metrics.scheduled += 1;
        self.shared.queue.add(task);
        self.shared.check_tasks_locked(&mut state);
    }

    /// Build a task, schedule it and return its handle.
    pub fn submit<T: Send + 'static>(&self, builder: TaskBuilder<T>) -> TaskHandle<T> {
        let (task, handle) = builder.build();
        self.schedule(task);
        handle
    }

    /// Re-run the admission pass.
    pub fn check_tasks(&self) {
        let mut state = self.shared.state.lock();
        self.shared.check_tasks_locked(&mut state);
    }

    /// Register a blocker. Running tasks are unaffected.
    pub fn block(&self, blocker: Arc<dyn Blocker>) {
        let mut state = self.shared.state.lock();
        state.blockers.push(blocker);
        debug!(blockers = state.blockers.len(), "Blocker registered");
    }

    /// Remove a previously registered blocker and re-run admission.
    /// Returns `false` if it was not registered.
    pub fn unblock(&self, blocker: &Arc<dyn Blocker>) -> bool {
        let mut state = self.shared.state.lock();
        let before = state.blockers.len();
        state.blockers.retain(|b| !same_blocker(b, blocker));
        let removed = state.blockers.len() != before;
        if removed {
            debug!(blockers = state.blockers.len(), "Blocker removed");
            self.shared.check_tasks_locked(&mut state);
        }
        removed
    }

    /// Replace the allocation map and re-run admission.
    pub fn set_thread_allocations_map(&self, allocations: AllocationMap) {
        let mut state = self.shared.state.lock();
        state.total_threads = compute_threads_count(&allocations);
        info!(
            "Allocation map replaced: {} lanes, {} total slots",
            allocations.len(),
            state.total_threads
        );
        state.allocation_map = allocations;
        self.shared.check_tasks_locked(&mut state);
    }

    pub fn allocation_map(&self) -> AllocationMap {
        self.shared.state.lock().allocation_map.clone()
    }

    pub fn total_threads(&self) -> usize {
        self.shared.state.lock().total_threads
    }

    pub fn running_count(&self) -> usize {
        self.shared.state.lock().running.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn queued_count(&self) -> usize {
        self.shared.queue.len()
    }

    /// Ids of tasks in the running set, in dispatch order.
    pub fn running_ids(&self) -> Vec<TaskId> {
        self.shared.state.lock().running.values().map(|r| r.task.id()).collect()
    }

    /// Ids of pending tasks, in FIFO order.
    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.shared.state.lock().pending.iter().map(|t| t.id()).collect()
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.shared.queue
    }

    /// Snapshot of the scheduler counters.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared.state.lock().metrics.clone()
    }
}
