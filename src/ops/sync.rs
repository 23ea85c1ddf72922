use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::io::backend::{Backend, BackendError, BatchOp, open_backend};
use crate::io::config_io::LoadedConfig;
use crate::io::lock::{FileLock, LockError};
use crate::io::recovery::{RecoveryCategory, log_unsaved_batch};
use crate::ops::list::{LoadReport, TaskList};

/// Error type for load/save orchestration
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// What a successful save wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Tasks physically removed from the index afterwards
    pub purged: usize,
}

impl SaveSummary {
    pub fn total(&self) -> usize {
        self.new + self.updated + self.deleted
    }
}

/// A backend plus everything needed to write to it safely: the lock file
/// location and the directory holding the recovery log.
pub struct Store {
    backend: Box<dyn Backend>,
    lock_target: PathBuf,
    state_dir: PathBuf,
    list_name: String,
    extra_keys: Vec<String>,
}

impl Store {
    /// Open the backend named by a config. With `create`, missing storage
    /// is allowed (for `tl init`).
    pub fn open(loaded: &LoadedConfig, create: bool) -> Result<Self, SyncError> {
        let config = &loaded.config;
        let backend = open_backend(&config.backend, &config.list.name, create)?;
        Ok(Store::new(
            backend,
            &config.backend.path,
            &loaded.state_dir,
            &config.list.name,
            &config.list.keys,
        ))
    }

    pub fn new(
        backend: Box<dyn Backend>,
        lock_target: &Path,
        state_dir: &Path,
        list_name: &str,
        extra_keys: &[String],
    ) -> Self {
        Store {
            backend,
            lock_target: lock_target.to_path_buf(),
            state_dir: state_dir.to_path_buf(),
            list_name: list_name.to_string(),
            extra_keys: extra_keys.to_vec(),
        }
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// An empty list with the configured schema
    pub fn empty_list(&self) -> TaskList {
        let mut list = TaskList::new(&self.list_name);
        for key in &self.extra_keys {
            list.add_key(key);
        }
        list
    }

    /// Create the backend's storage with the list's keys
    pub fn init(&mut self) -> Result<(), SyncError> {
        let keys = self.empty_list().keys().to_vec();
        let _lock = FileLock::acquire_default(&self.lock_target)?;
        self.backend.create(&keys)?;
        Ok(())
    }

    /// Read every stored task into a fresh, clean list
    pub fn load(&mut self) -> Result<(TaskList, LoadReport), SyncError> {
        let records = self.backend.load_all()?;
        let mut list = self.empty_list();
        let report = list.load(records);
        info!(
            backend = %self.backend.describe(),
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "list loaded"
        );
        Ok((list, report))
    }

    /// Write every pending change. On success the list is clean and deleted
    /// tasks are purged; on failure the list is untouched (still dirty) and
    /// the batch is copied to the recovery log.
    pub fn save(&mut self, list: &mut TaskList) -> Result<SaveSummary, SyncError> {
        if list.dirty_count() == 0 {
            return Ok(SaveSummary::default());
        }
        let batch = list.pending_batch();
        let mut summary = SaveSummary::default();
        for entry in &batch {
            match entry.op {
                BatchOp::New => summary.new += 1,
                BatchOp::Updated => summary.updated += 1,
                BatchOp::Deleted => summary.deleted += 1,
            }
        }

        let result = FileLock::acquire_default(&self.lock_target)
            .map_err(SyncError::from)
            .and_then(|_lock| self.backend.apply_batch(&batch).map_err(SyncError::from));
        if let Err(e) = result {
            error!(backend = %self.backend.describe(), error = %e, "save failed");
            log_unsaved_batch(
                &self.state_dir,
                RecoveryCategory::Save,
                &self.backend.describe(),
                &e.to_string(),
                &batch,
            );
            return Err(e);
        }

        list.clear_dirty();
        summary.purged = list.purge_deleted();
        info!(
            backend = %self.backend.describe(),
            new = summary.new,
            updated = summary.updated,
            deleted = summary.deleted,
            "list saved"
        );
        Ok(summary)
    }

    /// Copy pending changes to the recovery log before they are thrown away
    pub fn discard(&self, list: &TaskList, reason: &str) {
        log_unsaved_batch(
            &self.state_dir,
            RecoveryCategory::Discard,
            &self.backend.describe(),
            reason,
            &list.pending_batch(),
        );
    }
}
