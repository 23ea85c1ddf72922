use serde::Serialize;

use crate::io::recovery::RecoveryEntry;
use crate::model::{NodeId, Record};
use crate::ops::list::TaskList;
use crate::ops::screen::{LineItem, Screen};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TaskJson {
    pub id: String,
    pub name: String,
    pub status: String,
    pub complete: bool,
    pub fields: Record,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<TaskJson>,
}

#[derive(Serialize)]
pub struct CategoryJson {
    pub name: String,
    pub task_count: usize,
    pub open_count: usize,
    pub tasks: Vec<TaskJson>,
}

#[derive(Serialize)]
pub struct RecoveryEntryJson {
    pub timestamp: String,
    pub category: String,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

#[derive(Serialize)]
pub struct ImportJson {
    pub imported: usize,
    pub skipped: Vec<SkippedJson>,
}

#[derive(Serialize)]
pub struct SkippedJson {
    pub id: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// A task with its subtasks. With `all` unset, complete and deleted
/// tasks are dropped but their visible subtasks are hoisted in their place.
pub fn task_to_json(list: &TaskList, id: NodeId, all: bool) -> Vec<TaskJson> {
    let node = &list[id];
    let subtasks: Vec<TaskJson> = list
        .children(id)
        .flat_map(|child| task_to_json(list, child, all))
        .collect();
    if !all && !node.is_visible() {
        return subtasks;
    }
    vec![TaskJson {
        id: node.id().to_string(),
        name: node.name().to_string(),
        status: node.status().to_string(),
        complete: node.is_complete(),
        fields: node.record.clone(),
        subtasks,
    }]
}

pub fn categories_to_json(list: &TaskList, all: bool) -> Vec<CategoryJson> {
    list.categories()
        .filter(|cat| all || !cat.is_resolved())
        .map(|cat| {
            let mut tasks = Vec::new();
            let mut next = cat.root;
            while let Some(id) = next {
                tasks.extend(task_to_json(list, id, all));
                next = list[id].next_sibling;
            }
            CategoryJson {
                name: cat.name.clone(),
                task_count: cat.task_count,
                open_count: cat.open_count,
                tasks,
            }
        })
        .collect()
}

pub fn recovery_to_json(entry: &RecoveryEntry) -> RecoveryEntryJson {
    RecoveryEntryJson {
        timestamp: entry
            .timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        category: entry.category.to_string(),
        description: entry.description.clone(),
        fields: entry.fields.clone(),
        body: entry.body.clone(),
    }
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

/// Plain-text listing of the projected lines
pub fn format_screen(list: &TaskList, screen: &Screen) -> Vec<String> {
    screen
        .lines()
        .iter()
        .map(|line| match &line.item {
            LineItem::Category(name) => format_category(list, name),
            LineItem::Task(id) => format!(
                "{}{:>4}  {}",
                "  ".repeat(line.level - 1),
                list[*id].id(),
                list[*id].name()
            ),
            LineItem::Blank => String::new(),
        })
        .collect()
}

/// Listing of every task, completed ones included and marked
pub fn format_all(list: &TaskList) -> Vec<String> {
    let mut lines = Vec::new();
    for cat in list.categories() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format_category(list, &cat.name));
        for id in list.category_tasks(cat) {
            let node = &list[id];
            let mark = if node.is_complete() { "x" } else { " " };
            lines.push(format!(
                "{}{:>4} [{}] {}",
                "  ".repeat(node.level),
                node.id(),
                mark,
                node.name()
            ));
        }
    }
    lines
}

fn format_category(list: &TaskList, name: &str) -> String {
    match list.category(name) {
        Some(cat) => format!("{} ({}/{})", name, cat.open_count, cat.task_count),
        None => name.to_string(),
    }
}

pub fn format_record(record: &Record) -> Vec<String> {
    record.iter().map(|(k, v)| format!("{}: {}", k, v)).collect()
}

pub fn format_recovery_entry(entry: &RecoveryEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{}  {}: {}",
        entry
            .timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        entry.category,
        entry.description
    )];
    for (key, value) in &entry.fields {
        lines.push(format!("  {}: {}", key, value));
    }
    for line in entry.body.lines() {
        lines.push(format!("    {}", line));
    }
    lines
}
