//! Pruning of old rotation files.
//!
//! Listing the directory and deleting the oldest files is a read-then-act
//! sequence, so every pass for a given `(directory, base_filename)` runs under
//! the cross-process lock `_delete_{base_filename}.lock` in that directory.
//! A process that waits for the lock always sees what the previous holder
//! deleted.

use {
    crate::{lock::ProcessLock, rotation::RotationPattern, RollSinkError},
    std::{
        fs, io,
        path::{Path, PathBuf},
    },
};

/// Name of the lock file guarding cleanup of `base_filename`.
pub fn lock_file_name(base_filename: &str) -> String {
    format!("_delete_{base_filename}.lock")
}

/// Keeps at most `retention_count` rotation files for one base filename.
#[derive(Debug, Clone)]
pub struct RetentionCleaner {
    directory: PathBuf,
    lock_path: PathBuf,
    pattern: RotationPattern,
    retention_count: usize,
}

impl RetentionCleaner {
    pub fn new<P: AsRef<Path>>(
        directory: P,
        base_filename: &str,
        retention_count: usize,
    ) -> Result<Self, RollSinkError> {
        let directory = directory.as_ref().to_path_buf();
        Ok(RetentionCleaner {
            lock_path: directory.join(lock_file_name(base_filename)),
            pattern: RotationPattern::new(base_filename)?,
            directory,
            retention_count,
        })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Take the cleanup lock, then delete the oldest rotation files beyond the
    /// retention count. Returns the files this pass removed.
    pub fn cleanup(&self) -> Result<Vec<PathBuf>, RollSinkError> {
        let lock = ProcessLock::acquire(&self.lock_path)?;
        let removed = self.prune();
        lock.release();
        removed
    }

    /// Every rotation file for this base filename, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, RollSinkError> {
        let entries = fs::read_dir(&self.directory)
            .map_err(|err| RollSinkError::ListDirectoryFailed(self.directory.clone(), err.to_string()))?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !self.pattern.is_match(file_name) {
                continue;
            }
            // Entries can vanish between listing and stat when another
            // process is cleaning up; those are simply skipped.
            match entry.metadata() {
                Ok(metadata) if metadata.is_file() => files.push(entry.path()),
                _ => continue,
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn prune(&self) -> Result<Vec<PathBuf>, RollSinkError> {
        let files = self.list()?;
        if files.len() <= self.retention_count {
            return Ok(Vec::new());
        }

        let excess = files.len() - self.retention_count;
        let mut removed = Vec::with_capacity(excess);
        for path in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(target: "rollsink", path = %path.display(), "removed old log file");
                    removed.push(path);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(target: "rollsink", path = %path.display(), "old log file already removed");
                }
                Err(err) => {
                    tracing::warn!(
                        target: "rollsink",
                        path = %path.display(),
                        error = %err,
                        "failed to remove old log file"
                    );
                }
            }
        }
        Ok(removed)
    }
}
