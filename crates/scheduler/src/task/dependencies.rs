use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Opaque tag describing something a task's result depends on. The scheduler
/// never interprets these; callers build cancel/restart predicates from them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependencyTag {
    Connection(String),
    Ruleset(String),
    SelectionTimestamp(u64),
    DisplayType(String),
    ParentNode(String),
    Custom(String),
}

/// Set of dependency tags attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependencies {
    tags: BTreeSet<DependencyTag>,
}

impl TaskDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: DependencyTag) -> bool {
        self.tags.insert(tag)
    }

    pub fn contains(&self, tag: &DependencyTag) -> bool {
        self.tags.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DependencyTag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl FromIterator<DependencyTag> for TaskDependencies {
    fn from_iter<I: IntoIterator<Item = DependencyTag>>(iter: I) -> Self {
        Self { tags: iter.into_iter().collect() }
    }
}
