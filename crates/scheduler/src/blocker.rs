//! External vetoes on dispatch.
//!
//! While any registered blocker reports a task blocked, the scheduler will
//! not start it. Nothing is canceled; dispatch resumes on unblock.

use std::sync::Arc;

use crate::task::Task;

/// An external object that can keep tasks from starting.
pub trait Blocker: Send + Sync {
    fn is_blocked(&self, task: &dyn Task) -> bool;
}

/// [`Blocker`] backed by a closure.
pub struct PredicateBlocker<F> {
    predicate: F,
}

impl<F> PredicateBlocker<F>
where
    F: Fn(&dyn Task) -> bool + Send + Sync + 'static,
{
    pub fn new(predicate: F) -> Arc<Self> {
        Arc::new(Self { predicate })
    }
}

impl<F> Blocker for PredicateBlocker<F>
where
    F: Fn(&dyn Task) -> bool + Send + Sync,
{
    fn is_blocked(&self, task: &dyn Task) -> bool {
        (self.predicate)(task)
    }
}

/// Blocks every task. Used to pause dispatch wholesale, e.g. during shutdown
/// or while external state is being swapped.
pub struct BlockAll;

impl Blocker for BlockAll {
    fn is_blocked(&self, _task: &dyn Task) -> bool {
        true
    }
}

/// Identity comparison for registered blockers.
pub(crate) fn same_blocker(a: &Arc<dyn Blocker>, b: &Arc<dyn Blocker>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskBuilder;

    #[test]
    fn predicate_blocker_matches_priority() {
        let blocker = PredicateBlocker::new(|t: &dyn Task| t.priority() > 10);
        let (low, _h1) = TaskBuilder::new(5, |_| Ok(())).build();
        let (high, _h2) = TaskBuilder::new(50, |_| Ok(())).build();
        assert!(!blocker.is_blocked(low.as_ref()));
        assert!(blocker.is_blocked(high.as_ref()));
    }

    #[test]
    fn identity_comparison() {
        let a: Arc<dyn Blocker> = Arc::new(BlockAll);
        let b: Arc<dyn Blocker> = Arc::new(BlockAll);
        assert!(same_blocker(&a, &a.clone()));
        assert!(!same_blocker(&a, &b));
    }
}
