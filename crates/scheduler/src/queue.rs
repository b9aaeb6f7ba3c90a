//! Priority-ordered holding area for tasks that have not been dispatched.
//!
//! Buckets are scanned from the highest priority key down; tasks within a
//! bucket keep insertion order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use lanes_core::Priority;

use crate::task::Task;

/// Thread-safe priority queue of tasks, FIFO within a priority.
#[derive(Default)]
pub struct TaskQueue {
    buckets: Mutex<BTreeMap<Priority, VecDeque<Arc<dyn Task>>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail of the task's priority bucket.
    pub fn add(&self, task: Arc<dyn Task>) {
        self.buckets.lock().entry(task.priority()).or_default().push_back(task);
    }

    /// Remove and return the first task in scan order matching `predicate`.
    pub fn pop<F>(&self, mut predicate: F) -> Option<Arc<dyn Task>>
    where
        F: FnMut(&dyn Task) -> bool,
    {
        let mut buckets = self.buckets.lock();
        let (priority, index) = buckets.iter().rev().find_map(|(priority, bucket)| {
            bucket
                .iter()
                .position(|task| predicate(task.as_ref()))
                .map(|index| (*priority, index))
        })?;

        let bucket = buckets.get_mut(&priority)?;
        let task = bucket.remove(index);
        if bucket.is_empty() {
            buckets.remove(&priority);
        }
        task
    }

    /// All tasks matching `predicate`, in scan order. Does not remove them.
    pub fn get<F>(&self, mut predicate: F) -> Vec<Arc<dyn Task>>
    where
        F: FnMut(&dyn Task) -> bool,
    {
        self.buckets
            .lock()
            .values()
            .rev()
            .flat_map(|bucket| bucket.iter())
            .filter(|task| predicate(task.as_ref()))
            .cloned()
            .collect()
    }

    /// Remove, complete and cancel every cancelable match, publishing
    /// `Canceled` once it is out of the queue. Matches without a token stay
    /// queued but are still returned.
    pub fn cancel<F>(&self, mut predicate: F) -> Vec<Arc<dyn Task>>
    where
        F: FnMut(&dyn Task) -> bool,
    {
        let mut matched = Vec::new();
        let mut removed = Vec::new();
        {
            let mut buckets = self.buckets.lock();
            for bucket in buckets.values_mut().rev() {
                bucket.retain(|task| {
                    if !predicate(task.as_ref()) {
                        return true;
                    }
                    matched.push(Arc::clone(task));
                    if !task.is_cancelable() {
                        return true;
                    }
                    removed.push(Arc::clone(task));
                    false
                });
            }
            buckets.retain(|_, bucket| !bucket.is_empty());
        }

        for task in removed {
            debug!(task = %task.id(), "Canceling queued task");
            task.complete();
            task.cancel_unstarted();
        }
        matched
    }

    pub fn has_tasks(&self) -> bool {
        !self.buckets.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_tasks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskBuilder, TaskId, TaskOutcome};

    fn task(priority: Priority) -> Arc<dyn Task> {
        TaskBuilder::new(priority, |_| Ok(())).cancelable().build().0
    }

    fn ids(tasks: &[Arc<dyn Task>]) -> Vec<TaskId> {
        tasks.iter().map(|t| t.id()).collect()
    }

    #[test]
    fn pops_highest_priority_first() {
        let queue = TaskQueue::new();
        let low = task(1);
        let high = task(100);
        let mid = task(50);
        queue.add(low.clone());
        queue.add(high.clone());
        queue.add(mid.clone());

        assert_eq!(queue.pop(|_| true).unwrap().id(), high.id());
        assert_eq!(queue.pop(|_| true).unwrap().id(), mid.id());
        assert_eq!(queue.pop(|_| true).unwrap().id(), low.id());
        assert!(queue.pop(|_| true).is_none());
        assert!(!queue.has_tasks());
    }

    #[test]
    fn fifo_within_priority() {
        let queue = TaskQueue::new();
        let first = task(5);
        let second = task(5);
        queue.add(first.clone());
        queue.add(second.clone());
        assert_eq!(ids(&queue.get(|_| true)), vec![first.id(), second.id()]);
        assert_eq!(queue.pop(|_| true).unwrap().id(), first.id());
    }

    #[test]
    fn pop_skips_non_matching() {
        let queue = TaskQueue::new();
        let high = task(10);
        let low = task(1);
        queue.add(high.clone());
        queue.add(low.clone());

        let popped = queue.pop(|t| t.priority() < 5).unwrap();
        assert_eq!(popped.id(), low.id());
        assert_eq!(queue.len(), 1);
        assert!(queue.pop(|t| t.priority() < 5).is_none());
    }

    #[test]
    fn get_does_not_remove() {
        let queue = TaskQueue::new();
        queue.add(task(1));
        queue.add(task(2));
        assert_eq!(queue.get(|_| true).len(), 2);
        assert_eq!(queue.get(|t| t.priority() == 2).len(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn cancel_removes_cancelable_and_reports_all_matches() {
        let queue = TaskQueue::new();
        let (cancelable, handle) = TaskBuilder::new(3, |_| Ok(())).cancelable().build();
        let (pinned, _pinned_handle) = TaskBuilder::new(3, |_| Ok(())).build();
        let untouched = task(9);
        queue.add(cancelable.clone());
        queue.add(pinned.clone());
        queue.add(untouched.clone());

        let matched = queue.cancel(|t| t.priority() == 3);
        assert_eq!(ids(&matched), vec![cancelable.id(), pinned.id()]);

        assert!(handle.completion().is_complete());
        assert_eq!(handle.blocking_outcome(), TaskOutcome::Canceled);

        let left = ids(&queue.get(|_| true));
        assert_eq!(left, vec![untouched.id(), pinned.id()]);
    }

    #[test]
    fn empty_queue() {
        let queue = TaskQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.cancel(|_| true).is_empty());
    }
}
