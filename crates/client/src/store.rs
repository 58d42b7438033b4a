//! File-backed persistence of the locally active job id.
//!
//! The tracker survives process restarts by writing the id of the job
//! it is watching to a small state file. A missing or unreadable file
//! simply means no active job.

use std::io;
use std::path::PathBuf;

use corral_core::types::DbId;

/// Persists at most one active job id.
#[derive(Debug, Clone)]
pub struct ActiveJobStore {
    path: PathBuf,
}

impl ActiveJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The persisted job id, if a valid one is stored.
    pub fn load(&self) -> Option<DbId> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match contents.trim().parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(path = %self.path.display(), "Ignoring corrupt active-job file");
                None
            }
        }
    }

    /// Persist `job_id` as the active job.
    pub fn save(&self, job_id: DbId) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, job_id.to_string())
    }

    /// Forget the active job. Succeeds if no file exists.
    pub fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
