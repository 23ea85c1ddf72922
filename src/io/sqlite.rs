use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, info};

use super::backend::{Backend, BackendError, BatchEntry, BatchOp};
use crate::model::Record;

/// A task list stored as one table in a SQLite database
pub struct SqliteBackend {
    conn: Connection,
    path: PathBuf,
    table: String,
}

impl SqliteBackend {
    /// Open the database at `path`. Unless `create` is set, a missing
    /// database file is an error rather than being silently created.
    pub fn open(path: &Path, table: &str, create: bool) -> Result<Self, BackendError> {
        if !is_valid_name(table) {
            return Err(BackendError::InvalidName(table.to_string()));
        }
        if !create && !path.exists() {
            return Err(BackendError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(SqliteBackend {
            conn,
            path: path.to_path_buf(),
            table: table.to_string(),
        })
    }

    fn table_exists(&self) -> Result<bool, BackendError> {
        let count: i64 = self.conn.query_row(
            "select count(*) from sqlite_master where type = 'table' and name = ?1",
            params![self.table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl Backend for SqliteBackend {
    fn load_all(&mut self) -> Result<Vec<Record>, BackendError> {
        if !self.table_exists()? {
            return Err(BackendError::MissingTable(self.table.clone()));
        }
        let mut stmt = self.conn.prepare(&format!("select * from \"{}\"", self.table))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, column) in columns.iter().enumerate() {
                record.set(column, &value_text(row.get_ref(i)?));
            }
            records.push(record);
        }
        info!(table = %self.table, rows = records.len(), "loaded tasks from sqlite");
        Ok(records)
    }

    fn apply_batch(&mut self, batch: &[BatchEntry]) -> Result<(), BackendError> {
        if batch.is_empty() {
            return Ok(());
        }
        if !self.table_exists()? {
            return Err(BackendError::MissingTable(self.table.clone()));
        }
        let table = self.table.clone();
        let tx = self.conn.transaction()?;
        let mut columns = table_columns(&tx, &table)?;

        for entry in batch {
            let id = entry.record.value("id");
            match entry.op {
                BatchOp::Deleted => {
                    tx.execute(&format!("delete from \"{}\" where id = ?1", table), params![id])?;
                }
                BatchOp::New => {
                    ensure_columns(&tx, &table, &mut columns, &entry.record)?;
                    let keys: Vec<String> = entry.record.keys().map(|k| format!("\"{}\"", k)).collect();
                    let slots: Vec<String> = (1..=keys.len()).map(|i| format!("?{}", i)).collect();
                    let sql = format!(
                        "insert into \"{}\" ({}) values ({})",
                        table,
                        keys.join(", "),
                        slots.join(", ")
                    );
                    tx.execute(&sql, params_from_iter(entry.record.iter().map(|(_, v)| v)))?;
                }
                BatchOp::Updated => {
                    ensure_columns(&tx, &table, &mut columns, &entry.record)?;
                    let fields: Vec<(&str, &str)> =
                        entry.record.iter().filter(|(k, _)| *k != "id").collect();
                    let sets: Vec<String> = fields
                        .iter()
                        .enumerate()
                        .map(|(i, (k, _))| format!("\"{}\" = ?{}", k, i + 1))
                        .collect();
                    let sql = format!(
                        "update \"{}\" set {} where id = ?{}",
                        table,
                        sets.join(", "),
                        fields.len() + 1
                    );
                    let values = fields.iter().map(|(_, v)| *v).chain(std::iter::once(id));
                    let changed = tx.execute(&sql, params_from_iter(values))?;
                    if changed == 0 {
                        return Err(BackendError::MissingRow(id.to_string()));
                    }
                }
            }
        }

        tx.commit()?;
        info!(table = %table, entries = batch.len(), "saved batch to sqlite");
        Ok(())
    }

    fn create(&mut self, keys: &[String]) -> Result<(), BackendError> {
        let mut seen = HashSet::new();
        let mut defs = Vec::new();
        for key in keys {
            if !is_valid_name(key) {
                return Err(BackendError::InvalidName(key.clone()));
            }
            if !seen.insert(key.as_str()) {
                continue;
            }
            defs.push(match key.as_str() {
                "id" => "id text primary key".to_string(),
                "name" => "name text not null".to_string(),
                other => format!("\"{}\" text", other),
            });
        }
        let sql = format!(
            "create table if not exists \"{}\" ({})",
            self.table,
            defs.join(", ")
        );
        self.conn.execute(&sql, [])?;
        info!(table = %self.table, path = %self.path.display(), "created sqlite table");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}#{}", self.path.display(), self.table)
    }
}

/// Identifier check for table and column names spliced into SQL
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn value_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, BackendError> {
    let mut stmt = conn.prepare(&format!("pragma table_info(\"{}\")", table))?;
    let mut rows = stmt.query([])?;
    let mut columns = HashSet::new();
    while let Some(row) = rows.next()? {
        columns.insert(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

/// Add a text column for every key the table lacks
fn ensure_columns(
    conn: &Connection,
    table: &str,
    columns: &mut HashSet<String>,
    record: &Record,
) -> Result<(), BackendError> {
    for key in record.keys() {
        if columns.contains(key) {
            continue;
        }
        if !is_valid_name(key) {
            return Err(BackendError::InvalidName(key.to_string()));
        }
        conn.execute(&format!("alter table \"{}\" add column \"{}\" text", table, key), [])?;
        debug!(table, column = key, "added column");
        columns.insert(key.to_string());
    }
    Ok(())
}
