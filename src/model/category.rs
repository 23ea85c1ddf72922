use super::task::NodeId;

/// A named group owning a chain of top-level tasks.
///
/// Counts cover the whole tree below the root chain and are maintained
/// incrementally by the task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    /// All tasks in the category, subtasks included
    pub task_count: usize,
    /// Tasks not flagged complete
    pub open_count: usize,
    /// Head of the top-level sibling chain
    pub root: Option<NodeId>,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Category {
            name: name.to_string(),
            task_count: 0,
            open_count: 0,
            root: None,
        }
    }

    /// Every task in the category is complete
    pub fn is_resolved(&self) -> bool {
        self.open_count == 0
    }
}
