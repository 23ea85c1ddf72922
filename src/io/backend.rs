use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::io::delim::{DelimBackend, DelimError};
use crate::io::sqlite::SqliteBackend;
use crate::model::{BackendConfig, BackendKind, Record};

/// How a dirty task is written back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOp {
    New,
    Updated,
    Deleted,
}

/// One row of a save batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    pub op: BatchOp,
    pub record: Record,
}

/// Error type for storage backends
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid list name {0:?}: use letters, digits and underscores")]
    InvalidName(String),
    #[error("table {0} does not exist (run `tl init`)")]
    MissingTable(String),
    #[error("no row with id {0}")]
    MissingRow(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    Delim(#[from] DelimError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent storage for one task list.
///
/// The index never talks to storage directly: it is filled from
/// [`Backend::load_all`] and drained through [`Backend::apply_batch`].
pub trait Backend {
    /// Every stored row
    fn load_all(&mut self) -> Result<Vec<Record>, BackendError>;

    /// Persist a batch. Either the whole batch is applied or none of it.
    fn apply_batch(&mut self, batch: &[BatchEntry]) -> Result<(), BackendError>;

    /// Create empty storage with the given columns
    fn create(&mut self, keys: &[String]) -> Result<(), BackendError>;

    /// Short human-readable location, for messages and logs
    fn describe(&self) -> String;
}

/// Open the backend a config points at. `create` allows the storage to be
/// missing (used by `tl init`).
pub fn open_backend(
    config: &BackendConfig,
    list_name: &str,
    create: bool,
) -> Result<Box<dyn Backend>, BackendError> {
    match config.kind {
        BackendKind::Sqlite => Ok(Box::new(SqliteBackend::open(
            &config.path,
            list_name,
            create,
        )?)),
        BackendKind::Delim => Ok(Box::new(DelimBackend::open(&config.path, create)?)),
    }
}

/// Lock file guarding writes to a backend at `path`
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
