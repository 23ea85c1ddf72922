use std::fmt;

use serde::Serialize;

use super::record::Record;

/// Fields every task record must carry
pub const REQUIRED_KEYS: [&str; 5] = ["id", "parent_id", "category", "name", "status"];

/// Status value that marks a task complete (compared case-insensitively)
pub const STATUS_COMPLETE: &str = "Complete";

/// Status given to tasks created in the TUI or CLI
pub const STATUS_OPEN: &str = "Open";

/// Handle to a node in the task arena. Stable until the node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle flags on a task node
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TaskFlags(u8);

impl TaskFlags {
    pub const NONE: TaskFlags = TaskFlags(0);
    /// Not yet present in the backend
    pub const NEW: TaskFlags = TaskFlags(1);
    /// Modified since the last successful flush
    pub const DIRTY: TaskFlags = TaskFlags(1 << 1);
    pub const COMPLETE: TaskFlags = TaskFlags(1 << 2);
    /// Hidden from the screen, removed on the next flush
    pub const PENDING_DELETE: TaskFlags = TaskFlags(1 << 3);

    pub fn contains(self, other: TaskFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TaskFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: TaskFlags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for TaskFlags {
    type Output = TaskFlags;

    fn bitor(self, rhs: TaskFlags) -> TaskFlags {
        TaskFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for TaskFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (TaskFlags::NEW, "NEW"),
            (TaskFlags::DIRTY, "DIRTY"),
            (TaskFlags::COMPLETE, "COMPLETE"),
            (TaskFlags::PENDING_DELETE, "PENDING_DELETE"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            write!(f, "TaskFlags(NONE)")
        } else {
            write!(f, "TaskFlags({})", names.join(" | "))
        }
    }
}

/// A task record plus its position in the category tree.
///
/// Links are arena handles; the owning [`TaskList`](crate::ops::list::TaskList)
/// keeps them consistent.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub record: Record,
    /// Depth below the category root (0 = top-level)
    pub level: usize,
    pub flags: TaskFlags,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
}

impl TaskNode {
    pub fn new(record: Record) -> Self {
        let mut flags = TaskFlags::NONE;
        if is_complete_status(record.value("status")) {
            flags.insert(TaskFlags::COMPLETE);
        }
        TaskNode {
            record,
            level: 0,
            flags,
            parent: None,
            first_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }

    pub fn id(&self) -> &str {
        self.record.value("id")
    }

    pub fn parent_id(&self) -> &str {
        self.record.value("parent_id")
    }

    pub fn category(&self) -> &str {
        self.record.value("category")
    }

    pub fn name(&self) -> &str {
        self.record.value("name")
    }

    pub fn status(&self) -> &str {
        self.record.value("status")
    }

    pub fn is_complete(&self) -> bool {
        self.flags.contains(TaskFlags::COMPLETE)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(TaskFlags::DIRTY)
    }

    pub fn is_new(&self) -> bool {
        self.flags.contains(TaskFlags::NEW)
    }

    pub fn is_pending_delete(&self) -> bool {
        self.flags.contains(TaskFlags::PENDING_DELETE)
    }

    /// Whether the screen shows this task
    pub fn is_visible(&self) -> bool {
        !self.is_complete() && !self.is_pending_delete()
    }
}

pub fn is_complete_status(status: &str) -> bool {
    status.eq_ignore_ascii_case(STATUS_COMPLETE)
}
