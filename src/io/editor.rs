use std::io::Write;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::model::Record;

/// Result of an edit session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The buffer came back with the same fields and values
    Unmodified,
    Modified(Record),
}

/// Error type for the edit flow
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("the id cannot be changed ({from} -> {to})")]
    IdChanged { from: String, to: String },
    #[error("field `{0}` was removed")]
    MissingKey(String),
    #[error("could not start editor `{editor}`: {source}")]
    Spawn {
        editor: String,
        source: std::io::Error,
    },
    #[error("editor `{editor}` exited with {status}")]
    EditorFailed { editor: String, status: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pick the editor command: the configured override, then `$VISUAL`,
/// then `$EDITOR`, then `vi`.
pub fn resolve_editor(configured: Option<&str>) -> String {
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
    configured
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string)
        .or_else(|| env("VISUAL"))
        .or_else(|| env("EDITOR"))
        .unwrap_or_else(|| "vi".to_string())
}

/// The text handed to the editor: a short comment header and one
/// `key: value` line per field, in record order.
pub fn render_buffer(record: &Record) -> String {
    let mut out = format!(
        "# Editing task {}. One `key: value` per line; the id cannot change.\n\
         # Lines starting with # are ignored.\n",
        record.value("id")
    );
    for (key, value) in record.iter() {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Parse an edited buffer and check it against the record it came from.
pub fn parse_buffer(text: &str, original: &Record) -> Result<EditOutcome, EditError> {
    let mut edited = Record::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(EditError::Syntax {
                line: i + 1,
                message: "expected `key: value`".to_string(),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(EditError::Syntax {
                line: i + 1,
                message: "empty field name".to_string(),
            });
        }
        edited.set(key, value.strip_prefix(' ').unwrap_or(value));
    }

    let from = original.value("id").trim();
    let to = edited.value("id").trim();
    if from != to {
        return Err(EditError::IdChanged {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    if let Some(key) = original.keys().find(|k| !edited.contains(k)) {
        return Err(EditError::MissingKey(key.to_string()));
    }

    if &edited == original {
        Ok(EditOutcome::Unmodified)
    } else {
        Ok(EditOutcome::Modified(edited))
    }
}

/// Write `record` to a temp file, open it in `editor`, and parse the result.
/// The caller is responsible for giving the editor the terminal.
pub fn edit_record(record: &Record, editor: &str) -> Result<EditOutcome, EditError> {
    let mut file = tempfile::Builder::new()
        .prefix("tl-task-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(render_buffer(record).as_bytes())?;
    file.flush()?;

    run_editor(editor, file.path())?;

    let text = std::fs::read_to_string(file.path())?;
    let outcome = parse_buffer(&text, record)?;
    debug!(
        id = %record.value("id"),
        modified = matches!(outcome, EditOutcome::Modified(_)),
        "edit finished"
    );
    Ok(outcome)
}

fn run_editor(editor: &str, path: &Path) -> Result<(), EditError> {
    // Allow commands with arguments, e.g. "code --wait"
    let mut parts = editor.split_whitespace();
    let program = parts.next().unwrap_or("vi");
    let status = Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .map_err(|e| EditError::Spawn {
            editor: editor.to_string(),
            source: e,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(EditError::EditorFailed {
            editor: editor.to_string(),
            status: status.to_string(),
        })
    }
}
