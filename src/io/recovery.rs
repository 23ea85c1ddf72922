use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{error, warn};

use super::backend::{BatchEntry, BatchOp};
use super::delim::format_table;
use crate::model::Record;

/// Header written at the top of a new recovery log.
const FILE_HEADER: &str = "\
<!-- tasklist recovery log: changes that could not be saved.
     Each entry holds the unsaved batch as a pipe-delimited table.
     View with: tl recovery
     Safe to delete once the changes are re-applied. -->

---
";

/// Separator between timestamp and category in an entry header
const HEADER_SEP: &str = " -- ";

/// Why a recovery entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// A save to the backend failed
    Save,
    /// Changes were discarded on quit or reload
    Discard,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Save => write!(f, "save"),
            RecoveryCategory::Discard => write!(f, "discard"),
        }
    }
}

impl RecoveryCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "save" => Some(RecoveryCategory::Save),
            "discard" => Some(RecoveryCategory::Discard),
            _ => None,
        }
    }
}

/// A single entry in the recovery log.
#[derive(Debug, Clone)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

/// Return the path to the recovery log file.
pub fn recovery_log_path(state_dir: &Path) -> PathBuf {
    state_dir.join("recovery.log")
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl RecoveryEntry {
    /// Format this entry as a markdown block for the recovery log.
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {}{}{}: {}\n\n",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            HEADER_SEP,
            self.category,
            self.description,
        );
        for (key, value) in &self.fields {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        if !self.body.is_empty() {
            let fence = body_fence(&self.body);
            out.push_str(&format!("\n{}text\n", fence));
            out.push_str(&self.body);
            if !self.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&fence);
            out.push('\n');
        }
        out.push_str("\n---\n");
        out
    }
}

/// A backtick fence longer than any run of backticks opening a body line
fn body_fence(body: &str) -> String {
    let longest = body
        .lines()
        .map(|line| line.len() - line.trim_start_matches('`').len())
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

/// Append a recovery entry to the log. Failures are logged, never raised:
/// the caller is already handling a worse error.
pub fn log_recovery(state_dir: &Path, entry: RecoveryEntry) {
    if let Err(e) = log_recovery_inner(state_dir, &entry) {
        error!(error = %e, "could not write to recovery log");
    }
}

fn log_recovery_inner(state_dir: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    let path = recovery_log_path(state_dir);
    let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())?;
    Ok(())
}

/// Record a batch that did not reach the backend
pub fn log_unsaved_batch(
    state_dir: &Path,
    category: RecoveryCategory,
    backend: &str,
    reason: &str,
    batch: &[BatchEntry],
) {
    if batch.is_empty() {
        return;
    }
    warn!(backend, entries = batch.len(), reason, "writing unsaved changes to recovery log");
    log_recovery(
        state_dir,
        RecoveryEntry {
            timestamp: Utc::now(),
            category,
            description: format!("{} unsaved change(s)", batch.len()),
            fields: vec![
                ("Backend".to_string(), backend.to_string()),
                ("Reason".to_string(), reason.to_string()),
            ],
            body: batch_table(batch),
        },
    );
}

/// A batch as a delimited table with a leading `op` column
fn batch_table(batch: &[BatchEntry]) -> String {
    let mut header = vec!["op".to_string()];
    let rows: Vec<Record> = batch
        .iter()
        .map(|entry| {
            let op = match entry.op {
                BatchOp::New => "new",
                BatchOp::Updated => "updated",
                BatchOp::Deleted => "deleted",
            };
            for key in entry.record.keys() {
                if !header.iter().any(|h| h == key) {
                    header.push(key.to_string());
                }
            }
            let mut row = Record::new().with("op", op);
            row.merge(&entry.record);
            row
        })
        .collect();
    format_table(&header, &rows)
}

/// Read recovery entries, most recent first.
pub fn read_recovery_entries(state_dir: &Path, limit: Option<usize>) -> Vec<RecoveryEntry> {
    let content = match std::fs::read_to_string(recovery_log_path(state_dir)) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    let mut entries = parse_entries(&content);
    if let Some(n) = limit {
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
    }
    entries.reverse();
    entries
}

fn parse_entries(content: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some((timestamp, category, description)) =
            line.strip_prefix("## ").and_then(parse_entry_header)
        else {
            continue;
        };

        let mut fields = Vec::new();
        let mut body = String::new();
        let mut fence: Option<&str> = None;
        for line in lines.by_ref() {
            if let Some(open) = fence {
                if line == open {
                    fence = None;
                } else {
                    body.push_str(line);
                    body.push('\n');
                }
                continue;
            }
            if line == "---" {
                break;
            }
            if line.starts_with("```") {
                let ticks = line.len() - line.trim_start_matches('`').len();
                fence = Some(&line[..ticks]);
                continue;
            }
            if let Some((key, value)) = line.trim().split_once(": ") {
                fields.push((key.to_string(), value.to_string()));
            }
        }

        entries.push(RecoveryEntry {
            timestamp,
            category,
            description,
            fields,
            body,
        });
    }
    entries
}

/// Parse an entry header: `<timestamp> -- <category>: <description>`
fn parse_entry_header(header: &str) -> Option<(DateTime<Utc>, RecoveryCategory, String)> {
    let (timestamp, rest) = header.split_once(HEADER_SEP)?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .ok()?
        .with_timezone(&Utc);
    let (category, description) = rest.split_once(": ")?;
    let category = RecoveryCategory::parse_category(category)?;
    Some((timestamp, category, description.to_string()))
}
