//! Task predicates for bulk cancel/restart and completion queries.
//!
//! Most callers select tasks by the dependency tags they were built with,
//! e.g. "everything that reads connection X" when that connection closes.

use lanes_core::Priority;

use crate::task::{DependencyTag, Task, TaskId};

/// Boxed predicate over tasks.
pub type TaskPredicate = Box<dyn Fn(&dyn Task) -> bool + Send + Sync>;

/// Matches every task.
pub fn any() -> TaskPredicate {
    Box::new(|_| true)
}

pub fn has_id(id: TaskId) -> TaskPredicate {
    Box::new(move |task| task.id() == id)
}

/// Tasks carrying `tag`.
pub fn depends_on(tag: DependencyTag) -> TaskPredicate {
    Box::new(move |task| task.dependencies().contains(&tag))
}

/// Tasks carrying at least one of `tags`.
pub fn depends_on_any<I>(tags: I) -> TaskPredicate
where
    I: IntoIterator<Item = DependencyTag>,
{
    let tags: Vec<_> = tags.into_iter().collect();
    Box::new(move |task| tags.iter().any(|tag| task.dependencies().contains(tag)))
}

/// Tasks that depend on a selection made before `timestamp`.
pub fn selection_before(timestamp: u64) -> TaskPredicate {
    Box::new(move |task| {
        task.dependencies()
            .iter()
            .any(|tag| matches!(tag, DependencyTag::SelectionTimestamp(ts) if *ts < timestamp))
    })
}

pub fn priority_at_most(priority: Priority) -> TaskPredicate {
    Box::new(move |task| task.priority() <= priority)
}

/// Matches when every predicate does. An empty list matches everything.
pub fn all(predicates: Vec<TaskPredicate>) -> TaskPredicate {
    Box::new(move |task| predicates.iter().all(|p| p(task)))
}

pub fn not(predicate: TaskPredicate) -> TaskPredicate {
    Box::new(move |task| !predicate(task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskBuilder;

    fn tagged(priority: Priority, tags: &[DependencyTag]) -> std::sync::Arc<dyn Task> {
        let mut builder = TaskBuilder::new(priority, |_| Ok(()));
        for tag in tags {
            builder = builder.depends_on(tag.clone());
        }
        builder.build().0
    }

    #[test]
    fn dependency_predicates() {
        let conn = DependencyTag::Connection("db-1".into());
        let ruleset = DependencyTag::Ruleset("items".into());
        let task = tagged(10, &[conn.clone()]);

        assert!(depends_on(conn.clone())(task.as_ref()));
        assert!(!depends_on(ruleset.clone())(task.as_ref()));
        assert!(depends_on_any([ruleset.clone(), conn])(task.as_ref()));
        assert!(!depends_on_any([ruleset])(task.as_ref()));
    }

    #[test]
    fn selection_timestamp() {
        let task = tagged(1, &[DependencyTag::SelectionTimestamp(100)]);
        assert!(selection_before(101)(task.as_ref()));
        assert!(!selection_before(100)(task.as_ref()));
        assert!(!selection_before(5)(tagged(1, &[]).as_ref()));
    }

    #[test]
    fn combinators() {
        let task = tagged(50, &[DependencyTag::DisplayType("grid".into())]);
        let grid = DependencyTag::DisplayType("grid".into());

        assert!(any()(task.as_ref()));
        assert!(has_id(task.id())(task.as_ref()));
        assert!(!has_id(TaskId::new())(task.as_ref()));
        assert!(priority_at_most(50)(task.as_ref()));
        assert!(!priority_at_most(49)(task.as_ref()));
        assert!(all(vec![depends_on(grid.clone()), priority_at_most(60)])(task.as_ref()));
        assert!(!all(vec![depends_on(grid), priority_at_most(10)])(task.as_ref()));
        assert!(all(Vec::new())(task.as_ref()));
        assert!(!not(any())(task.as_ref()));
    }
}
