use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::info;

use super::backend::{Backend, BackendError, BatchEntry, BatchOp};
use super::recovery::atomic_write;
use crate::model::Record;

/// Field separator
pub const SEP: char = '|';

/// Error type for the delimited-file format
#[derive(Debug, thiserror::Error)]
pub enum DelimError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("missing header line")]
    MissingHeader,
}

/// A parsed delimited file: the header plus one record per row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub records: Vec<Record>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first character of a field
    Start,
    Unquoted,
    Quoted,
    /// Saw a quote inside a quoted field: either an escape or the end
    QuoteInQuoted,
    /// After the closing quote, only whitespace may follow
    Closed,
}

/// Split delimited text into rows of fields, with the line each row starts on.
/// Blank lines are skipped. Quoted fields may contain separators, newlines
/// and doubled quotes.
pub fn parse_rows(text: &str) -> Result<Vec<(usize, Vec<String>)>, DelimError> {
    let text = text.replace("\r\n", "\n");
    let mut rows = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut state = State::Start;
    let mut line = 1;
    let mut row_line = 1;

    let syntax = |line: usize, message: &str| DelimError::Syntax {
        line,
        message: message.to_string(),
    };

    for c in text.chars() {
        match state {
            State::Start => match c {
                '"' => state = State::Quoted,
                SEP => fields.push(String::new()),
                '\n' => {
                    if !fields.is_empty() {
                        fields.push(String::new());
                        rows.push((row_line, std::mem::take(&mut fields)));
                    }
                    line += 1;
                    row_line = line;
                }
                c if c.is_whitespace() => {}
                c => {
                    field.push(c);
                    state = State::Unquoted;
                }
            },
            State::Unquoted => match c {
                SEP => {
                    fields.push(field.trim_end().to_string());
                    field.clear();
                    state = State::Start;
                }
                '\n' => {
                    fields.push(field.trim_end().to_string());
                    field.clear();
                    rows.push((row_line, std::mem::take(&mut fields)));
                    state = State::Start;
                    line += 1;
                    row_line = line;
                }
                '"' => return Err(syntax(line, "quote inside an unquoted field")),
                c => field.push(c),
            },
            State::Quoted => match c {
                '"' => state = State::QuoteInQuoted,
                '\n' => {
                    field.push(c);
                    line += 1;
                }
                c => field.push(c),
            },
            State::QuoteInQuoted => match c {
                '"' => {
                    field.push('"');
                    state = State::Quoted;
                }
                SEP => {
                    fields.push(std::mem::take(&mut field));
                    state = State::Start;
                }
                '\n' => {
                    fields.push(std::mem::take(&mut field));
                    rows.push((row_line, std::mem::take(&mut fields)));
                    state = State::Start;
                    line += 1;
                    row_line = line;
                }
                c if c.is_whitespace() => {
                    fields.push(std::mem::take(&mut field));
                    state = State::Closed;
                }
                _ => return Err(syntax(line, "text after a closing quote")),
            },
            State::Closed => match c {
                SEP => state = State::Start,
                '\n' => {
                    rows.push((row_line, std::mem::take(&mut fields)));
                    state = State::Start;
                    line += 1;
                    row_line = line;
                }
                c if c.is_whitespace() => {}
                _ => return Err(syntax(line, "text after a closing quote")),
            },
        }
    }

    match state {
        State::Quoted => return Err(syntax(line, "unterminated quoted field")),
        State::Unquoted => fields.push(field.trim_end().to_string()),
        State::QuoteInQuoted => fields.push(field),
        State::Start if !fields.is_empty() => fields.push(String::new()),
        State::Start | State::Closed => {}
    }
    if !fields.is_empty() {
        rows.push((row_line, fields));
    }
    Ok(rows)
}

/// Parse a delimited table. Every row must have as many fields as the header.
pub fn parse_table(text: &str) -> Result<Table, DelimError> {
    let mut rows = parse_rows(text)?.into_iter();
    let Some((_, header)) = rows.next() else {
        return Ok(Table::default());
    };
    if header.iter().all(|h| h.is_empty()) {
        return Err(DelimError::MissingHeader);
    }

    let mut records = Vec::new();
    for (line, fields) in rows {
        if fields.len() != header.len() {
            return Err(DelimError::FieldCount {
                line,
                expected: header.len(),
                found: fields.len(),
            });
        }
        records.push(header.iter().zip(fields.iter()).collect());
    }
    Ok(Table { header, records })
}

/// Quote a field when it would not survive a plain round trip
pub fn format_field(value: &str) -> String {
    let needs_quotes = value.contains([SEP, '"', '\n', '\r'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write a header line and one row per record. Keys a record lacks are
/// written empty.
pub fn format_table<'a, I>(header: &[String], records: I) -> String
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut out = String::new();
    let head: Vec<String> = header.iter().map(|h| format_field(h)).collect();
    out.push_str(&head.join("|"));
    out.push('\n');
    for record in records {
        let row: Vec<String> = header.iter().map(|h| format_field(record.value(h))).collect();
        out.push_str(&row.join("|"));
        out.push('\n');
    }
    out
}

/// A task list stored as a single pipe-delimited file
pub struct DelimBackend {
    path: PathBuf,
}

impl DelimBackend {
    pub fn open(path: &Path, create: bool) -> Result<Self, BackendError> {
        if !create && !path.exists() {
            return Err(BackendError::NotFound(path.to_path_buf()));
        }
        Ok(DelimBackend {
            path: path.to_path_buf(),
        })
    }

    fn read_table(&self) -> Result<Table, BackendError> {
        if !self.path.exists() {
            return Ok(Table::default());
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(parse_table(&text)?)
    }
}

impl Backend for DelimBackend {
    fn load_all(&mut self) -> Result<Vec<Record>, BackendError> {
        let table = self.read_table()?;
        info!(path = %self.path.display(), rows = table.records.len(), "loaded tasks from file");
        Ok(table.records)
    }

    fn apply_batch(&mut self, batch: &[BatchEntry]) -> Result<(), BackendError> {
        if batch.is_empty() {
            return Ok(());
        }
        let table = self.read_table()?;
        let mut header = table.header;
        let mut rows: IndexMap<String, Record> = table
            .records
            .into_iter()
            .map(|r| (r.value("id").to_string(), r))
            .collect();

        for entry in batch {
            let id = entry.record.value("id").to_string();
            match entry.op {
                BatchOp::Deleted => {
                    rows.shift_remove(&id);
                }
                BatchOp::New => {
                    rows.insert(id, entry.record.clone());
                }
                BatchOp::Updated => match rows.get_mut(&id) {
                    Some(row) => row.merge(&entry.record),
                    None => return Err(BackendError::MissingRow(id)),
                },
            }
            for key in entry.record.keys() {
                if !header.iter().any(|h| h == key) {
                    header.push(key.to_string());
                }
            }
        }

        atomic_write(&self.path, format_table(&header, rows.values()).as_bytes())?;
        info!(path = %self.path.display(), entries = batch.len(), "saved batch to file");
        Ok(())
    }

    fn create(&mut self, keys: &[String]) -> Result<(), BackendError> {
        let existing = self.read_table()?;
        if !existing.header.is_empty() {
            return Ok(());
        }
        let mut header: Vec<String> = Vec::new();
        for key in keys {
            if !header.contains(key) {
                header.push(key.clone());
            }
        }
        atomic_write(&self.path, format_table(&header, []).as_bytes())?;
        info!(path = %self.path.display(), "created task file");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("delim:{}", self.path.display())
    }
}
