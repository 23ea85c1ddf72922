use std::collections::{HashMap, HashSet};
use std::ops::{Index, IndexMut};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::io::backend::{BatchEntry, BatchOp};
use crate::model::{
    Category, NodeId, REQUIRED_KEYS, Record, STATUS_COMPLETE, TaskFlags, TaskNode,
    is_complete_status,
};

/// Error type for task list mutations. A rejected operation leaves the list untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    #[error("parent task not found: {0}")]
    DanglingParent(String),
    #[error("task {id} cannot be placed under its own subtask {parent}")]
    CycleRejected { id: String, parent: String },
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task {id} has category {category:?} but its parent is in {parent_category:?}")]
    CategoryMismatch {
        id: String,
        category: String,
        parent_category: String,
    },
}

/// What [`TaskList::upsert`] did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new task was created
    Inserted(NodeId),
    /// An existing task was updated where it stands
    Updated(NodeId),
    /// An existing task changed parent or category and was moved
    Relocated(NodeId),
}

impl Upsert {
    pub fn node(self) -> NodeId {
        match self {
            Upsert::Inserted(id) | Upsert::Updated(id) | Upsert::Relocated(id) => id,
        }
    }
}

/// Outcome of a bulk [`TaskList::load`]
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    /// Records that could not be placed, with the reason
    pub skipped: Vec<(Record, ListError)>,
}

/// The in-memory task index: a forest of category-rooted task trees.
///
/// Nodes live in an arena addressed by [`NodeId`]; parent, child and sibling
/// links are handles into it. Category counts and the dirty counter are
/// maintained incrementally by every mutation.
#[derive(Debug, Clone)]
pub struct TaskList {
    name: String,
    keys: Vec<String>,
    categories: IndexMap<String, Category>,
    nodes: Vec<Option<TaskNode>>,
    free: Vec<usize>,
    by_id: HashMap<String, NodeId>,
    max_id: u64,
    dirty_count: usize,
    len: usize,
}

impl Index<NodeId> for TaskList {
    type Output = TaskNode;

    fn index(&self, id: NodeId) -> &TaskNode {
        match self.nodes.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale task handle {:?}", id),
        }
    }
}

impl IndexMut<NodeId> for TaskList {
    fn index_mut(&mut self, id: NodeId) -> &mut TaskNode {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale task handle {:?}", id),
        }
    }
}

impl TaskList {
    pub fn new(name: &str) -> Self {
        TaskList {
            name: name.to_string(),
            keys: REQUIRED_KEYS.iter().map(|k| k.to_string()).collect(),
            categories: IndexMap::new(),
            nodes: Vec::new(),
            free: Vec::new(),
            by_id: HashMap::new(),
            max_id: 0,
            dirty_count: 0,
            len: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    /// Field names every task is expected to carry, required ones first
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Register an extra field name. Returns false if it was already known.
    pub fn add_key(&mut self, key: &str) -> bool {
        if key.is_empty() || self.contains_key(key) {
            return false;
        }
        self.keys.push(key.to_string());
        true
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Number of tasks in the list
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty_count
    }

    /// Highest numeric id ever seen
    pub fn max_id(&self) -> u64 {
        self.max_id
    }

    /// Id to assign to the next task created
    pub fn next_id(&self) -> u64 {
        self.max_id + 1
    }

    /// Look up a node handle; `None` once the node has been removed
    pub fn node(&self, id: NodeId) -> Option<&TaskNode> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub fn find_by_id(&self, task_id: &str) -> Option<NodeId> {
        self.by_id.get(task_id.trim()).copied()
    }

    pub fn find(&self, task_id: &str) -> Option<&TaskNode> {
        self.find_by_id(task_id).map(|id| &self[id])
    }

    /// Categories in the order they were created
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.get(name)
    }

    /// Direct children of a node, in chain order
    pub fn children(&self, id: NodeId) -> Siblings<'_> {
        Siblings {
            list: self,
            next: self[id].first_child,
        }
    }

    /// Pre-order walk of a category's whole tree
    pub fn category_tasks(&self, category: &Category) -> Preorder<'_> {
        Preorder {
            list: self,
            stack: category.root.into_iter().collect(),
            root: None,
        }
    }

    /// Pre-order walk of a node and its descendants
    pub fn subtree(&self, id: NodeId) -> Preorder<'_> {
        Preorder {
            list: self,
            stack: vec![id],
            root: Some(id),
        }
    }

    /// Every node, category by category, each tree in pre-order
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.categories().flat_map(|cat| self.category_tasks(cat))
    }

    /// Dirty nodes in traversal order
    pub fn collect_dirty(&self) -> Vec<NodeId> {
        if self.dirty_count == 0 {
            return Vec::new();
        }
        self.iter().filter(|&id| self[id].is_dirty()).collect()
    }

    /// Dirty nodes tagged with the backend operation that persists them.
    /// Tasks created and deleted before ever being saved are left out.
    pub fn pending_batch(&self) -> Vec<BatchEntry> {
        self.collect_dirty()
            .into_iter()
            .filter_map(|id| {
                let node = &self[id];
                let op = match (node.is_new(), node.is_pending_delete()) {
                    (true, true) => return None,
                    (_, true) => BatchOp::Deleted,
                    (true, false) => BatchOp::New,
                    (false, false) => BatchOp::Updated,
                };
                Some(BatchEntry {
                    op,
                    record: node.record.clone(),
                })
            })
            .collect()
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self[node].parent;
        }
        false
    }

    // -----------------------------------------------------------------------
    // Insert / update / relocate
    // -----------------------------------------------------------------------

    /// Insert a new task or update the existing task with the same id.
    ///
    /// A fresh insert is flagged NEW and DIRTY. An update with unchanged
    /// `parent_id` and `category` merges fields in place; otherwise the task
    /// and its subtree are detached and reattached under the new parent.
    pub fn upsert(&mut self, record: Record) -> Result<Upsert, ListError> {
        let record = trim_structural(record);
        self.validate(&record)?;

        let Some(existing) = self.find_by_id(record.value("id")) else {
            return self
                .insert_fresh(record, TaskFlags::NEW | TaskFlags::DIRTY)
                .map(Upsert::Inserted);
        };

        let node = &self[existing];
        let moved = node.parent_id().trim() != record.value("parent_id").trim()
            || node.category() != record.value("category");

        if !moved {
            self.update_in_place(existing, &record);
            debug!(id = %record.value("id"), "task updated in place");
            return Ok(Upsert::Updated(existing));
        }

        // All checks happen before the first mutation
        let parent = self.resolve_parent(&record, Some(existing))?;

        self.detach(existing);
        self.merge_fields(existing, &record);
        let category = record.value("category").to_string();
        let descendants: Vec<NodeId> = self.subtree(existing).skip(1).collect();
        for id in descendants {
            if self[id].category() != category {
                self[id].record.set("category", &category);
                self.mark_dirty(id);
            }
        }
        self.attach(existing, parent);

        debug!(
            id = %record.value("id"),
            parent = %record.value("parent_id"),
            category = %category,
            "task relocated"
        );
        Ok(Upsert::Relocated(existing))
    }

    /// Insert records read from a backend. Nodes are inserted clean, parents
    /// before children regardless of input order. Records that cannot be
    /// placed are reported rather than aborting the load.
    pub fn load<I>(&mut self, records: I) -> LoadReport
    where
        I: IntoIterator<Item = Record>,
    {
        let mut report = LoadReport::default();
        let mut pending: Vec<Record> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for record in records {
            let record = trim_structural(record);
            if let Err(e) = self.validate(&record) {
                report.skipped.push((record, e));
                continue;
            }
            let task_id = record.value("id").trim().to_string();
            if self.by_id.contains_key(&task_id) || !seen.insert(task_id.clone()) {
                let e = ListError::SchemaViolation(format!("duplicate id {}", task_id));
                report.skipped.push((record, e));
                continue;
            }
            for key in record.keys() {
                if !self.contains_key(key) {
                    self.keys.push(key.to_string());
                }
            }
            pending.push(record);
        }

        // Each pass places every record whose parent is already in the tree
        loop {
            let before = pending.len();
            let mut waiting = Vec::new();
            for record in pending {
                let parent_id = record.value("parent_id").trim();
                if !parent_id.is_empty() && !self.by_id.contains_key(parent_id) {
                    waiting.push(record);
                    continue;
                }
                match self.insert_fresh(record.clone(), TaskFlags::NONE) {
                    Ok(_) => report.loaded += 1,
                    Err(e) => report.skipped.push((record, e)),
                }
            }
            pending = waiting;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }

        for record in pending {
            let e = ListError::DanglingParent(record.value("parent_id").trim().to_string());
            report.skipped.push((record, e));
        }

        for (record, e) in &report.skipped {
            warn!(id = %record.value("id"), error = %e, "skipped record on load");
        }
        debug!(loaded = report.loaded, skipped = report.skipped.len(), "load finished");
        report
    }

    /// Upsert a batch of records (the import path). Unlike [`TaskList::load`]
    /// the changes are dirty, and known ids update existing tasks. Records
    /// whose parent only appears later in the batch are retried.
    pub fn import<I>(&mut self, records: I) -> LoadReport
    where
        I: IntoIterator<Item = Record>,
    {
        let mut report = LoadReport::default();
        let mut pending: Vec<Record> = records.into_iter().collect();
        loop {
            let before = pending.len();
            let mut waiting = Vec::new();
            for record in pending {
                match self.upsert(record.clone()) {
                    Ok(_) => {
                        for key in record.keys() {
                            self.add_key(key);
                        }
                        report.loaded += 1;
                    }
                    Err(ListError::DanglingParent(_)) => waiting.push(record),
                    Err(e) => report.skipped.push((record, e)),
                }
            }
            pending = waiting;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        for record in pending {
            let e = ListError::DanglingParent(record.value("parent_id").trim().to_string());
            report.skipped.push((record, e));
        }
        for (record, e) in &report.skipped {
            warn!(id = %record.value("id"), error = %e, "skipped record on import");
        }
        report
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Mark a task and its whole subtree complete. Returns how many tasks
    /// changed from open to complete.
    pub fn mark_complete(&mut self, id: NodeId) -> Result<usize, ListError> {
        self.check_live(id)?;
        let ids: Vec<NodeId> = self.subtree(id).collect();
        let mut flipped = 0;
        for node in ids {
            if !self[node].is_complete() {
                self[node].flags.insert(TaskFlags::COMPLETE);
                flipped += 1;
            }
            self[node].record.set("status", STATUS_COMPLETE);
            self.mark_dirty(node);
        }
        let name = self[id].category().to_string();
        if let Some(cat) = self.categories.get_mut(&name) {
            cat.open_count -= flipped;
        }
        debug!(id = %self[id].id(), flipped, "marked complete");
        Ok(flipped)
    }

    /// Flag a task and its subtree for deletion on the next flush.
    /// Returns the number of tasks flagged.
    pub fn mark_delete(&mut self, id: NodeId) -> Result<usize, ListError> {
        self.check_live(id)?;
        let ids: Vec<NodeId> = self.subtree(id).collect();
        let count = ids.len();
        for node in ids {
            self[node].flags.insert(TaskFlags::PENDING_DELETE);
            self.mark_dirty(node);
        }
        debug!(id = %self[id].id(), count, "marked for deletion");
        Ok(count)
    }

    /// Physically remove a task and its subtree. Returns the number removed.
    pub fn remove(&mut self, id: NodeId) -> Result<usize, ListError> {
        self.check_live(id)?;
        self.detach(id);
        let ids: Vec<NodeId> = self.subtree(id).collect();
        for &node in &ids {
            if let Some(removed) = self.nodes[node.0].take() {
                if removed.is_dirty() {
                    self.dirty_count -= 1;
                }
                self.by_id.remove(removed.id().trim());
                self.free.push(node.0);
                self.len -= 1;
            }
        }
        Ok(ids.len())
    }

    /// Remove every subtree flagged for deletion. Returns the number removed.
    pub fn purge_deleted(&mut self) -> usize {
        let roots: Vec<NodeId> = self
            .iter()
            .filter(|&id| {
                let node = &self[id];
                node.is_pending_delete()
                    && node.parent.is_none_or(|p| !self[p].is_pending_delete())
            })
            .collect();
        let mut removed = 0;
        for root in roots {
            removed += self.remove(root).unwrap_or(0);
        }
        if removed > 0 {
            debug!(removed, "purged deleted tasks");
        }
        removed
    }

    /// Forget all pending changes: clears DIRTY and NEW on every node.
    pub fn clear_dirty(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.flags.remove(TaskFlags::DIRTY | TaskFlags::NEW);
        }
        self.dirty_count = 0;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn check_live(&self, id: NodeId) -> Result<(), ListError> {
        match self.node(id) {
            Some(_) => Ok(()),
            None => Err(ListError::NotFound(format!("#{}", id.index()))),
        }
    }

    /// Check required fields and the id format. Returns the numeric id.
    fn validate(&self, record: &Record) -> Result<u64, ListError> {
        if let Some(key) = record.missing(&REQUIRED_KEYS) {
            return Err(ListError::SchemaViolation(format!(
                "missing required field `{}`",
                key
            )));
        }
        let raw = record.value("id").trim();
        let numeric = raw.parse::<u64>().map_err(|_| {
            ListError::SchemaViolation(format!("id {:?} is not a non-negative integer", raw))
        })?;
        // The largest id would leave no room for `next_id`
        if numeric == u64::MAX {
            return Err(ListError::SchemaViolation(format!("id {} is out of range", raw)));
        }
        if record.value("category").trim().is_empty() {
            return Err(ListError::SchemaViolation(format!(
                "task {} has an empty category",
                raw
            )));
        }
        Ok(numeric)
    }

    /// Find the parent a record asks for. `moving` is the node being
    /// relocated, if any, so cycles can be refused.
    fn resolve_parent(
        &self,
        record: &Record,
        moving: Option<NodeId>,
    ) -> Result<Option<NodeId>, ListError> {
        let task_id = record.value("id").trim();
        let parent_id = record.value("parent_id").trim();
        if parent_id.is_empty() {
            return Ok(None);
        }
        if parent_id == task_id {
            return Err(ListError::CycleRejected {
                id: task_id.to_string(),
                parent: parent_id.to_string(),
            });
        }
        let parent = match self.find_by_id(parent_id) {
            Some(p) if !self[p].is_pending_delete() => p,
            _ => return Err(ListError::DanglingParent(parent_id.to_string())),
        };
        if moving.is_some_and(|node| self.is_ancestor(node, parent)) {
            return Err(ListError::CycleRejected {
                id: task_id.to_string(),
                parent: parent_id.to_string(),
            });
        }
        let parent_category = self[parent].category();
        if parent_category != record.value("category") {
            return Err(ListError::CategoryMismatch {
                id: task_id.to_string(),
                category: record.value("category").to_string(),
                parent_category: parent_category.to_string(),
            });
        }
        Ok(Some(parent))
    }

    fn insert_fresh(&mut self, record: Record, flags: TaskFlags) -> Result<NodeId, ListError> {
        let numeric = self.validate(&record)?;
        let parent = self.resolve_parent(&record, None)?;

        let task_id = record.value("id").trim().to_string();
        let mut node = TaskNode::new(record);
        node.flags.insert(flags);
        let dirty = node.is_dirty();

        let id = self.alloc(node);
        self.by_id.insert(task_id.clone(), id);
        self.attach(id, parent);
        self.len += 1;
        if dirty {
            self.dirty_count += 1;
        }
        if numeric > self.max_id {
            self.max_id = numeric;
        }
        debug!(id = %task_id, "task inserted");
        Ok(id)
    }

    fn alloc(&mut self, node: TaskNode) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn mark_dirty(&mut self, id: NodeId) {
        let node = &mut self[id];
        if !node.is_dirty() {
            node.flags.insert(TaskFlags::DIRTY);
            self.dirty_count += 1;
        }
    }

    /// Merge a record into a node and sync the COMPLETE flag with its
    /// status. Returns the new completion state if it flipped.
    fn merge_fields(&mut self, id: NodeId, record: &Record) -> Option<bool> {
        let node = &mut self[id];
        let was_complete = node.is_complete();
        node.record.merge(record);
        let now_complete = is_complete_status(node.status());
        if now_complete {
            node.flags.insert(TaskFlags::COMPLETE);
        } else {
            node.flags.remove(TaskFlags::COMPLETE);
        }
        self.mark_dirty(id);
        (was_complete != now_complete).then_some(now_complete)
    }

    fn update_in_place(&mut self, id: NodeId, record: &Record) {
        if let Some(now_complete) = self.merge_fields(id, record) {
            let name = self[id].category().to_string();
            if let Some(cat) = self.categories.get_mut(&name) {
                if now_complete {
                    cat.open_count -= 1;
                } else {
                    cat.open_count += 1;
                }
            }
        }
    }

    /// Link a detached node as the head of its parent's child chain, or of
    /// its category's root chain, then re-level its subtree and add its
    /// counts to the category.
    fn attach(&mut self, id: NodeId, parent: Option<NodeId>) {
        let name = self[id].category().to_string();
        if !self.categories.contains_key(&name) {
            debug!(category = %name, "category created");
            self.categories.insert(name.clone(), Category::new(&name));
        }

        let (head, level) = match parent {
            Some(p) => {
                let head = self[p].first_child.replace(id);
                (head, self[p].level + 1)
            }
            None => {
                let head = self
                    .categories
                    .get_mut(&name)
                    .and_then(|cat| cat.root.replace(id));
                (head, 0)
            }
        };

        {
            let node = &mut self[id];
            node.parent = parent;
            node.prev_sibling = None;
            node.next_sibling = head;
        }
        if let Some(h) = head {
            self[h].prev_sibling = Some(id);
        }

        self.relevel(id, level);

        let (total, open) = self.subtree_counts(id);
        if let Some(cat) = self.categories.get_mut(&name) {
            cat.task_count += total;
            cat.open_count += open;
        }
    }

    /// Unlink a node (with its subtree) from its chain and subtract its
    /// counts. A category left without tasks is destroyed.
    fn detach(&mut self, id: NodeId) {
        let name = self[id].category().to_string();
        let (total, open) = self.subtree_counts(id);
        let (parent, prev, next) = {
            let node = &self[id];
            (node.parent, node.prev_sibling, node.next_sibling)
        };

        match (prev, parent) {
            (Some(p), _) => self[p].next_sibling = next,
            (None, Some(par)) => self[par].first_child = next,
            (None, None) => {
                if let Some(cat) = self.categories.get_mut(&name) {
                    cat.root = next;
                }
            }
        }
        if let Some(n) = next {
            self[n].prev_sibling = prev;
        }

        {
            let node = &mut self[id];
            node.parent = None;
            node.prev_sibling = None;
            node.next_sibling = None;
        }

        let emptied = match self.categories.get_mut(&name) {
            Some(cat) => {
                cat.task_count -= total;
                cat.open_count -= open;
                cat.task_count == 0
            }
            None => false,
        };
        if emptied {
            self.categories.shift_remove(&name);
            debug!(category = %name, "category removed");
        }
    }

    /// Recompute levels below `id`, which is placed at `level`. Only the
    /// node's own descendants are touched.
    fn relevel(&mut self, id: NodeId, level: usize) {
        self[id].level = level;
        let descendants: Vec<NodeId> = self.subtree(id).skip(1).collect();
        for node in descendants {
            if let Some(parent) = self[node].parent {
                self[node].level = self[parent].level + 1;
            }
        }
    }

    /// (total, open) over a node and its descendants
    fn subtree_counts(&self, id: NodeId) -> (usize, usize) {
        self.subtree(id).fold((0, 0), |(total, open), node| {
            (total + 1, open + usize::from(!self[node].is_complete()))
        })
    }
}

/// Strip surrounding whitespace from the fields that place a task, so
/// `"Work "` and `"Work"` name the same category
fn trim_structural(mut record: Record) -> Record {
    for key in ["id", "parent_id", "category"] {
        if let Some(value) = record.get(key) {
            let trimmed = value.trim();
            if trimmed.len() != value.len() {
                let trimmed = trimmed.to_string();
                record.set(key, &trimmed);
            }
        }
    }
    record
}

/// Iterator over a sibling chain
pub struct Siblings<'a> {
    list: &'a TaskList,
    next: Option<NodeId>,
}

impl Iterator for Siblings<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.list[id].next_sibling;
        Some(id)
    }
}

/// Depth-first pre-order iterator. Walks the siblings of the start node
/// too, unless it was started on a single subtree.
pub struct Preorder<'a> {
    list: &'a TaskList,
    stack: Vec<NodeId>,
    root: Option<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let node = &self.list[id];
        if self.root != Some(id) {
            if let Some(next) = node.next_sibling {
                self.stack.push(next);
            }
        }
        if let Some(child) = node.first_child {
            self.stack.push(child);
        }
        Some(id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn task(id: u64, parent: &str, category: &str, name: &str) -> Record {
        Record::new()
            .with("id", &id.to_string())
            .with("parent_id", parent)
            .with("category", category)
            .with("name", name)
            .with("status", "Open")
    }

    /// Verify every structural invariant by full traversal.
    pub(crate) fn assert_consistent(list: &TaskList) {
        let mut seen = 0;
        let mut dirty = 0;
        for cat in list.categories() {
            let mut total = 0;
            let mut open = 0;
            if let Some(root) = cat.root {
                assert_eq!(list[root].prev_sibling, None, "root head has a prev link");
            }
            for id in list.category_tasks(cat) {
                let node = &list[id];
                total += 1;
                if !node.is_complete() {
                    open += 1;
                }
                if node.is_dirty() {
                    dirty += 1;
                }
                assert_eq!(node.category(), cat.name, "category field of {}", node.id());
                match node.parent {
                    Some(p) => {
                        assert_eq!(node.level, list[p].level + 1, "level of {}", node.id());
                        assert_eq!(node.parent_id(), list[p].id());
                    }
                    None => {
                        assert_eq!(node.level, 0, "level of {}", node.id());
                        assert_eq!(node.parent_id(), "");
                    }
                }
                if let Some(next) = node.next_sibling {
                    assert_eq!(list[next].prev_sibling, Some(id));
                    assert_eq!(list[next].parent, node.parent);
                }
                if let Some(child) = node.first_child {
                    assert_eq!(list[child].parent, Some(id));
                    assert_eq!(list[child].prev_sibling, None);
                }
                assert_eq!(list.find_by_id(node.id()), Some(id));
            }
            assert!(total > 0, "empty category {} kept", cat.name);
            assert_eq!(cat.task_count, total, "task_count of {}", cat.name);
            assert_eq!(cat.open_count, open, "open_count of {}", cat.name);
            seen += total;
        }
        assert_eq!(list.len(), seen);
        assert_eq!(list.dirty_count(), dirty);
    }

    fn ids(list: &TaskList, nodes: impl Iterator<Item = NodeId>) -> Vec<String> {
        nodes.map(|id| list[id].id().to_string()).collect()
    }

    fn sample() -> TaskList {
        let mut list = TaskList::new("todo");
        list.upsert(task(1, "", "Work", "A")).unwrap();
        list.upsert(task(2, "1", "Work", "B")).unwrap();
        list.upsert(task(3, "2", "Work", "C")).unwrap();
        list.upsert(task(4, "", "Work", "D")).unwrap();
        list.upsert(task(5, "", "Home", "E")).unwrap();
        list
    }

    #[test]
    fn insert_builds_tree_and_counts() {
        let list = sample();
        assert_consistent(&list);
        let work = list.category("Work").unwrap();
        assert_eq!(work.task_count, 4);
        assert_eq!(work.open_count, 4);
        assert_eq!(list.category("Home").unwrap().task_count, 1);
        assert_eq!(list.len(), 5);
        assert_eq!(list.max_id(), 5);
        assert_eq!(list.next_id(), 6);

        let c = list.find("3").unwrap();
        assert_eq!(c.level, 2);
        // New tasks go to the head of their chain
        assert_eq!(ids(&list, list.category_tasks(work)), vec!["4", "1", "2", "3"]);
    }

    #[test]
    fn fresh_insert_is_new_and_dirty() {
        let list = sample();
        let a = list.find("1").unwrap();
        assert!(a.is_new());
        assert!(a.is_dirty());
        assert_eq!(list.dirty_count(), 5);
    }

    #[test]
    fn update_in_place_keeps_position_and_children() {
        let mut list = sample();
        list.clear_dirty();
        let b = list.find_by_id("2").unwrap();
        let outcome = list
            .upsert(task(2, "1", "Work", "B renamed").with("effort", "L"))
            .unwrap();
        assert_eq!(outcome, Upsert::Updated(b));
        let node = &list[b];
        assert_eq!(node.name(), "B renamed");
        assert_eq!(node.record.get("effort"), Some("L"));
        assert_eq!(node.level, 1);
        assert_eq!(ids(&list, list.children(b)), vec!["3"]);
        assert_eq!(list.dirty_count(), 1);
        assert_consistent(&list);
    }

    #[test]
    fn repeated_upsert_counts_dirty_once() {
        let mut list = sample();
        list.clear_dirty();
        list.upsert(task(2, "1", "Work", "B")).unwrap();
        assert_eq!(list.dirty_count(), 1);
        list.upsert(task(2, "1", "Work", "B")).unwrap();
        assert_eq!(list.dirty_count(), 1);
        assert_consistent(&list);
    }

    #[test]
    fn relocate_to_new_category() {
        let mut list = TaskList::new("todo");
        list.upsert(task(1, "", "Work", "A")).unwrap();
        list.upsert(task(2, "1", "Work", "B")).unwrap();

        let outcome = list.upsert(task(2, "", "Home", "B")).unwrap();
        assert!(matches!(outcome, Upsert::Relocated(_)));
        assert_eq!(list.category("Work").unwrap().task_count, 1);
        let home = list.category("Home").unwrap();
        assert_eq!(home.task_count, 1);
        assert_eq!(home.open_count, 1);
        assert_eq!(list.find("2").unwrap().level, 0);
        assert_consistent(&list);
    }

    #[test]
    fn relocate_moves_subtree_and_relevels() {
        let mut list = sample();
        // Move B (with child C) under D
        list.upsert(task(2, "4", "Work", "B")).unwrap();
        assert_eq!(list.find("2").unwrap().level, 1);
        assert_eq!(list.find("3").unwrap().level, 2);
        let d = list.find_by_id("4").unwrap();
        assert_eq!(ids(&list, list.children(d)), vec!["2"]);
        let a = list.find_by_id("1").unwrap();
        assert_eq!(list.children(a).count(), 0);

        // Now hoist B to the top level; C follows one level up
        list.upsert(task(2, "", "Work", "B")).unwrap();
        assert_eq!(list.find("2").unwrap().level, 0);
        assert_eq!(list.find("3").unwrap().level, 1);
        assert_consistent(&list);
    }

    #[test]
    fn relevel_does_not_touch_siblings() {
        let mut list = TaskList::new("todo");
        list.upsert(task(1, "", "Work", "A")).unwrap();
        list.upsert(task(2, "1", "Work", "B")).unwrap();
        list.upsert(task(3, "1", "Work", "C")).unwrap();
        list.upsert(task(4, "", "Work", "D")).unwrap();
        // 3 is the head of A's chain with sibling 2; move 3 under D
        list.upsert(task(3, "4", "Work", "C")).unwrap();
        assert_eq!(list.find("2").unwrap().level, 1);
        assert_eq!(list.find("3").unwrap().level, 1);
        assert_consistent(&list);
    }

    #[test]
    fn relocate_subtree_across_categories_rewrites_descendants() {
        let mut list = sample();
        list.clear_dirty();
        list.upsert(task(1, "", "Home", "A")).unwrap();
        assert_eq!(list.find("2").unwrap().category(), "Home");
        assert_eq!(list.find("3").unwrap().category(), "Home");
        assert!(list.find("3").unwrap().is_dirty());
        assert_eq!(list.dirty_count(), 3);
        assert_eq!(list.category("Work").unwrap().task_count, 1);
        assert_eq!(list.category("Home").unwrap().task_count, 4);
        assert_consistent(&list);
    }

    #[test]
    fn moving_last_task_destroys_category() {
        let mut list = sample();
        list.upsert(task(5, "", "Errands", "E")).unwrap();
        assert!(list.category("Home").is_none());
        let names: Vec<&str> = list.categories().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Work", "Errands"]);
        assert_consistent(&list);
    }

    #[test]
    fn cycle_is_rejected_and_tree_unchanged() {
        let mut list = sample();
        let before: Vec<(String, usize)> = list
            .iter()
            .map(|id| (list[id].id().to_string(), list[id].level))
            .collect();

        let err = list.upsert(task(1, "3", "Work", "A")).unwrap_err();
        assert_eq!(
            err,
            ListError::CycleRejected {
                id: "1".into(),
                parent: "3".into()
            }
        );
        let err = list.upsert(task(1, "1", "Work", "A")).unwrap_err();
        assert!(matches!(err, ListError::CycleRejected { .. }));

        let after: Vec<(String, usize)> = list
            .iter()
            .map(|id| (list[id].id().to_string(), list[id].level))
            .collect();
        assert_eq!(before, after);
        assert_eq!(list.find("1").unwrap().parent_id(), "");
        assert_consistent(&list);
    }

    #[test]
    fn dangling_parent_is_rejected() {
        let mut list = sample();
        let err = list.upsert(task(2, "99", "Work", "B")).unwrap_err();
        assert_eq!(err, ListError::DanglingParent("99".into()));
        let err = list.upsert(task(10, "42", "Work", "new")).unwrap_err();
        assert_eq!(err, ListError::DanglingParent("42".into()));
        assert!(list.find("10").is_none());
        assert_eq!(list.find("2").unwrap().parent_id(), "1");
        assert_consistent(&list);
    }

    #[test]
    fn category_must_match_parent() {
        let mut list = sample();
        let err = list.upsert(task(9, "1", "Home", "X")).unwrap_err();
        assert!(matches!(err, ListError::CategoryMismatch { .. }));
        assert!(list.find("9").is_none());
        assert_consistent(&list);
    }

    #[test]
    fn schema_violations() {
        let mut list = TaskList::new("todo");
        let missing = Record::new().with("id", "1").with("name", "x");
        assert!(matches!(
            list.upsert(missing),
            Err(ListError::SchemaViolation(_))
        ));
        let bad_id = task(0, "", "Work", "x").with("id", "abc");
        assert!(matches!(
            list.upsert(bad_id),
            Err(ListError::SchemaViolation(_))
        ));
        let no_category = task(1, "", "", "x");
        assert!(matches!(
            list.upsert(no_category),
            Err(ListError::SchemaViolation(_))
        ));
        assert!(list.is_empty());
        assert_eq!(list.categories().count(), 0);
    }

    #[test]
    fn largest_id_is_refused_so_next_id_cannot_overflow() {
        let mut list = TaskList::new("todo");
        assert!(matches!(
            list.upsert(task(u64::MAX, "", "Work", "x")),
            Err(ListError::SchemaViolation(_))
        ));
        let report = list.load(vec![task(u64::MAX, "", "Work", "x")]);
        assert_eq!(report.loaded, 0);
        assert_eq!(report.skipped.len(), 1);

        list.upsert(task(u64::MAX - 1, "", "Work", "y")).unwrap();
        assert_eq!(list.max_id(), u64::MAX - 1);
        assert_eq!(list.next_id(), u64::MAX);
        assert_consistent(&list);
    }

    #[test]
    fn category_and_ids_are_trimmed() {
        let mut list = TaskList::new("todo");
        list.upsert(task(1, "", "Work", "A")).unwrap();
        list.upsert(task(2, "", "Work ", "B")).unwrap();
        list.upsert(task(3, " 1 ", " Work", "C")).unwrap();
        let names: Vec<&str> = list.categories().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Work"]);
        assert_eq!(list.find("2").unwrap().category(), "Work");
        assert_eq!(list.find("3").unwrap().parent_id(), "1");

        // Trailing space on an update is not a move
        list.clear_dirty();
        let b = list.find_by_id("2").unwrap();
        let upsert = list.upsert(task(2, "", "Work  ", "B2")).unwrap();
        assert_eq!(upsert, Upsert::Updated(b));

        let mut loaded = TaskList::new("todo");
        loaded.load(vec![task(7, "", " Home ", "D"), task(8, "7", "Home", "E")]);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.category("Home").unwrap().task_count, 2);
        assert_consistent(&list);
        assert_consistent(&loaded);
    }

    #[test]
    fn mark_complete_flips_subtree() {
        let mut list = TaskList::new("todo");
        list.upsert(task(1, "", "Work", "A")).unwrap();
        list.upsert(task(2, "1", "Work", "B")).unwrap();
        list.clear_dirty();

        let a = list.find_by_id("1").unwrap();
        assert_eq!(list.mark_complete(a).unwrap(), 2);
        for id in ["1", "2"] {
            let node = list.find(id).unwrap();
            assert!(node.is_complete());
            assert!(node.is_dirty());
            assert_eq!(node.status(), "Complete");
        }
        let work = list.category("Work").unwrap();
        assert_eq!(work.open_count, 0);
        assert_eq!(work.task_count, 2);
        assert_eq!(list.dirty_count(), 2);

        // Already complete: nothing flips, nothing double counts
        assert_eq!(list.mark_complete(a).unwrap(), 0);
        assert_eq!(list.dirty_count(), 2);
        assert_consistent(&list);
    }

    #[test]
    fn mark_complete_on_subtask_leaves_siblings_open() {
        let mut list = sample();
        let b = list.find_by_id("2").unwrap();
        assert_eq!(list.mark_complete(b).unwrap(), 2);
        assert!(!list.find("1").unwrap().is_complete());
        assert!(!list.find("4").unwrap().is_complete());
        assert_eq!(list.category("Work").unwrap().open_count, 2);
        assert_consistent(&list);
    }

    #[test]
    fn status_edit_toggles_open_count() {
        let mut list = sample();
        list.upsert(task(4, "", "Work", "D").with("status", "complete"))
            .unwrap();
        assert_eq!(list.category("Work").unwrap().open_count, 3);
        list.upsert(task(4, "", "Work", "D")).unwrap();
        assert_eq!(list.category("Work").unwrap().open_count, 4);
        assert_consistent(&list);
    }

    #[test]
    fn relocating_complete_task_moves_counts() {
        let mut list = sample();
        let b = list.find_by_id("2").unwrap();
        list.mark_complete(b).unwrap();
        list.upsert(task(2, "", "Home", "B").with("status", "Complete"))
            .unwrap();
        let home = list.category("Home").unwrap();
        assert_eq!(home.task_count, 3);
        assert_eq!(home.open_count, 1);
        let work = list.category("Work").unwrap();
        assert_eq!(work.task_count, 2);
        assert_eq!(work.open_count, 2);
        assert_consistent(&list);
    }

    #[test]
    fn collect_dirty_in_traversal_order() {
        let mut list = sample();
        list.clear_dirty();
        assert!(list.collect_dirty().is_empty());
        list.upsert(task(3, "2", "Work", "C2")).unwrap();
        list.upsert(task(5, "", "Home", "E2")).unwrap();
        list.upsert(task(4, "", "Work", "D2")).unwrap();
        let dirty = list.collect_dirty();
        assert_eq!(ids(&list, dirty.into_iter()), vec!["4", "3", "5"]);
    }

    #[test]
    fn collect_dirty_on_empty_list() {
        let list = TaskList::new("todo");
        assert!(list.collect_dirty().is_empty());
    }

    #[test]
    fn pending_batch_tags_operations() {
        let mut list = TaskList::new("todo");
        list.load(vec![task(1, "", "Work", "A"), task(2, "", "Work", "B")]);
        list.upsert(task(1, "", "Work", "A2")).unwrap();
        let b = list.find_by_id("2").unwrap();
        list.mark_delete(b).unwrap();
        list.upsert(task(3, "", "Home", "C")).unwrap();
        let gone = list.upsert(task(4, "", "Home", "D")).unwrap().node();
        list.mark_delete(gone).unwrap();

        let batch: Vec<(BatchOp, String)> = list
            .pending_batch()
            .into_iter()
            .map(|e| (e.op, e.record.value("id").to_string()))
            .collect();
        assert_eq!(
            batch,
            vec![
                (BatchOp::Deleted, "2".to_string()),
                (BatchOp::Updated, "1".to_string()),
                (BatchOp::New, "3".to_string()),
            ]
        );
    }

    #[test]
    fn clear_dirty_resets_flags() {
        let mut list = sample();
        list.clear_dirty();
        assert_eq!(list.dirty_count(), 0);
        assert!(list.iter().all(|id| !list[id].is_dirty() && !list[id].is_new()));
        assert_consistent(&list);
    }

    #[test]
    fn mark_delete_then_purge() {
        let mut list = sample();
        list.clear_dirty();
        let b = list.find_by_id("2").unwrap();
        assert_eq!(list.mark_delete(b).unwrap(), 2);
        assert!(list.find("3").unwrap().is_pending_delete());
        assert_eq!(list.dirty_count(), 2);
        // Still counted until physically removed
        assert_eq!(list.category("Work").unwrap().task_count, 4);
        assert_consistent(&list);

        list.clear_dirty();
        assert_eq!(list.purge_deleted(), 2);
        assert!(list.find("2").is_none());
        assert!(list.find("3").is_none());
        assert_eq!(list.category("Work").unwrap().task_count, 2);
        assert!(list.node(b).is_none());
        assert_consistent(&list);
    }

    #[test]
    fn pending_delete_parent_is_not_a_valid_parent() {
        let mut list = sample();
        let d = list.find_by_id("4").unwrap();
        list.mark_delete(d).unwrap();
        let err = list.upsert(task(8, "4", "Work", "late child")).unwrap_err();
        assert_eq!(err, ListError::DanglingParent("4".into()));
    }

    #[test]
    fn remove_updates_counters_and_reuses_slots() {
        let mut list = sample();
        let dirty_before = list.dirty_count();
        let a = list.find_by_id("1").unwrap();
        assert_eq!(list.remove(a).unwrap(), 3);
        assert_eq!(list.dirty_count(), dirty_before - 3);
        assert_eq!(list.len(), 2);
        assert_eq!(list.max_id(), 5);
        assert_eq!(list.remove(a), Err(ListError::NotFound(format!("#{}", a.index()))));

        let home = list.find_by_id("5").unwrap();
        list.remove(home).unwrap();
        assert!(list.category("Home").is_none());

        // Freed slots are reused
        let id = list.upsert(task(6, "", "Home", "F")).unwrap().node();
        assert!(id == a || id == home || id.index() < 5);
        assert_consistent(&list);
    }

    #[test]
    fn load_places_children_given_before_parents() {
        let mut list = TaskList::new("todo");
        let records = vec![
            task(3, "2", "Work", "C"),
            task(2, "1", "Work", "B"),
            task(1, "", "Work", "A").with("effort", "S"),
            task(7, "", "Home", "H").with("status", "Complete"),
        ];
        let report = list.load(records);
        assert_eq!(report.loaded, 4);
        assert!(report.skipped.is_empty());
        assert_eq!(list.find("3").unwrap().level, 2);
        assert_eq!(list.dirty_count(), 0);
        assert_eq!(list.max_id(), 7);
        assert!(list.contains_key("effort"));
        assert_eq!(list.category("Home").unwrap().open_count, 0);
        assert_consistent(&list);
    }

    #[test]
    fn load_reports_unplaceable_records() {
        let mut list = TaskList::new("todo");
        let records = vec![
            task(1, "", "Work", "A"),
            task(2, "9", "Work", "orphan"),
            task(1, "", "Work", "duplicate"),
            Record::new().with("id", "4"),
            task(5, "1", "Home", "wrong category"),
        ];
        let report = list.load(records);
        assert_eq!(report.loaded, 1);
        let reasons: Vec<&ListError> = report.skipped.iter().map(|(_, e)| e).collect();
        assert_eq!(reasons.len(), 4);
        assert!(reasons.contains(&&ListError::DanglingParent("9".into())));
        assert!(
            reasons
                .iter()
                .any(|e| matches!(e, ListError::CategoryMismatch { .. }))
        );
        assert_consistent(&list);
    }

    #[test]
    fn import_updates_known_and_orders_parents() {
        let mut list = TaskList::new("todo");
        list.load(vec![task(1, "", "Work", "A")]);
        let report = list.import(vec![
            task(3, "2", "Work", "C"),
            task(2, "", "Work", "B").with("effort", "M"),
            task(1, "", "Work", "A renamed"),
            task(4, "77", "Work", "orphan"),
        ]);
        assert_eq!(report.loaded, 3);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].1, ListError::DanglingParent("77".into()));
        assert_eq!(list.find("1").unwrap().name(), "A renamed");
        assert!(!list.find("1").unwrap().is_new());
        assert!(list.find("3").unwrap().is_new());
        assert_eq!(list.find("3").unwrap().level, 1);
        assert!(list.contains_key("effort"));
        assert_eq!(list.dirty_count(), 3);
        assert_consistent(&list);
    }

    #[test]
    fn add_key_dedups() {
        let mut list = TaskList::new("todo");
        assert!(!list.add_key("id"));
        assert!(list.add_key("effort"));
        assert!(!list.add_key("effort"));
        assert_eq!(list.keys().len(), 6);
    }

    #[test]
    fn counts_hold_over_mixed_operations() {
        let mut list = TaskList::new("todo");
        let categories = ["Work", "Home", "Errands"];
        // Deterministic pseudo-random sequence
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for step in 0..400u64 {
            let roll = next() % 10;
            let target = 1 + next() % 30;
            let existing = list.find(&target.to_string()).map(|n| n.category().to_string());
            match roll {
                0..=4 => {
                    // Insert or relocate, either at the top level or under a random task
                    let parent = 1 + next() % 30;
                    let parent_cat = list.find(&parent.to_string()).map(|n| n.category().to_string());
                    let (parent_id, category) = match parent_cat {
                        Some(cat) if next() % 2 == 0 => (parent.to_string(), cat),
                        _ => (
                            String::new(),
                            categories[(next() % 3) as usize].to_string(),
                        ),
                    };
                    let _ = list.upsert(task(target, &parent_id, &category, &format!("t{}", step)));
                }
                5 | 6 => {
                    if let Some(id) = list.find_by_id(&target.to_string()) {
                        list.mark_complete(id).unwrap();
                    }
                }
                7 => {
                    if let Some(id) = list.find_by_id(&target.to_string()) {
                        list.mark_delete(id).unwrap();
                    }
                }
                8 => {
                    if let Some(id) = list.find_by_id(&target.to_string()) {
                        list.remove(id).unwrap();
                    }
                }
                _ => {
                    if existing.is_some() && next() % 4 == 0 {
                        list.clear_dirty();
                        list.purge_deleted();
                    }
                }
            }
            assert_consistent(&list);
        }
    }
}
