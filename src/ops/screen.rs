use crate::model::NodeId;
use crate::ops::list::TaskList;

/// What a screen line shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineItem {
    Category(String),
    Task(NodeId),
    /// Separator between categories
    Blank,
}

/// One line of the flattened list.
///
/// `level` is the display depth: category headers are 0, top-level tasks
/// 1, their subtasks 2, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub level: usize,
    pub item: LineItem,
}

impl Line {
    pub fn task(&self) -> Option<NodeId> {
        match self.item {
            LineItem::Task(id) => Some(id),
            _ => None,
        }
    }
}

/// The task list flattened into numbered lines, plus a scroll offset.
///
/// Lines go stale after any mutation of the list; call [`Screen::rebuild`]
/// before reading them again. The offset survives rebuilds.
#[derive(Debug, Clone, Default)]
pub struct Screen {
    lines: Vec<Line>,
    offset: usize,
}

impl Screen {
    pub fn project(list: &TaskList) -> Self {
        let mut screen = Screen::default();
        screen.rebuild(list);
        screen
    }

    /// Regenerate lines from the list, keeping the offset
    pub fn rebuild(&mut self, list: &TaskList) {
        self.lines = project_lines(list);
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_at(&self, n: usize) -> Option<&Line> {
        self.lines.get(n)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// The lines in a window of `height` rows starting at the offset
    pub fn visible(&self, height: usize) -> &[Line] {
        let start = self.offset.min(self.lines.len());
        let end = start.saturating_add(height).min(self.lines.len());
        &self.lines[start..end]
    }

    /// Scroll just far enough that `cursor` is inside a window of `height`
    /// rows. Also pulls the offset back when the list has shrunk.
    pub fn follow(&mut self, cursor: usize, height: usize) {
        if height == 0 {
            return;
        }
        let max_offset = self.lines.len().saturating_sub(height);
        if self.offset > max_offset {
            self.offset = max_offset;
        }
        if cursor < self.offset {
            self.offset = cursor;
        } else if cursor >= self.offset + height {
            self.offset = cursor + 1 - height;
        }
    }

    /// Line number showing `node`, if it is visible
    pub fn find_task(&self, node: NodeId) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.item == LineItem::Task(node))
    }

    pub fn first_task_line(&self) -> Option<usize> {
        self.lines.iter().position(|line| line.task().is_some())
    }

    /// Task lines in order, as (line number, node)
    pub fn task_lines(&self) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        self.lines
            .iter()
            .filter_map(|line| line.task().map(|id| (line.number, id)))
    }
}

/// Flatten the list. Categories with no open tasks are skipped. Hidden
/// tasks (complete or pending delete) emit no line, but their descendants
/// are still walked.
fn project_lines(list: &TaskList) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut push = |level: usize, item: LineItem| {
        let number = lines.len();
        lines.push(Line {
            number,
            level,
            item,
        });
    };

    let mut first = true;
    for category in list.categories().filter(|c| !c.is_resolved()) {
        if !first {
            push(0, LineItem::Blank);
        }
        first = false;
        push(0, LineItem::Category(category.name.clone()));
        for id in list.category_tasks(category) {
            let node = &list[id];
            if node.is_visible() {
                push(node.level + 1, LineItem::Task(id));
            }
        }
    }
    lines
}
