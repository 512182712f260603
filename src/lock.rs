//! Exclusive advisory file locks shared between processes.
//!
//! The lock is identified by a path on disk. The file's content is never read;
//! it only exists so every process has something to take an OS lock on. When
//! a holder exits or dies the operating system drops the lock, so a crashed
//! process can never wedge the others.

use {
    crate::RollSinkError,
    std::{
        fmt,
        fs::{File, OpenOptions},
        io,
        path::{Path, PathBuf},
        sync::OnceLock,
    },
};

/// A platform mechanism for taking an exclusive lock on an open file.
pub trait LockBackend: Send + Sync {
    /// Short identifier used in diagnostics.
    fn name(&self) -> &'static str;

    /// Block until the calling process holds an exclusive lock on `file`.
    fn lock(&self, file: &File) -> io::Result<()>;

    /// Release a lock previously taken with [`LockBackend::lock`].
    fn unlock(&self, file: &File) -> io::Result<()>;
}

/// `flock(2)` on Unix-like systems.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FlockBackend;

#[cfg(unix)]
impl FlockBackend {
    fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        loop {
            // SAFETY: the descriptor is owned by `file`, which outlives this call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

#[cfg(unix)]
impl LockBackend for FlockBackend {
    fn name(&self) -> &'static str {
        "flock"
    }

    fn lock(&self, file: &File) -> io::Result<()> {
        Self::flock(file, libc::LOCK_EX)
    }

    fn unlock(&self, file: &File) -> io::Result<()> {
        Self::flock(file, libc::LOCK_UN)
    }
}

/// Portable locking through `fs2`, which maps to `LockFileEx` on Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fs2Backend;

impl LockBackend for Fs2Backend {
    fn name(&self) -> &'static str {
        "fs2"
    }

    fn lock(&self, file: &File) -> io::Result<()> {
        fs2::FileExt::lock_exclusive(file)
    }

    fn unlock(&self, file: &File) -> io::Result<()> {
        fs2::FileExt::unlock(file)
    }
}

/// The backend for this platform, chosen on first use and cached.
pub fn platform_backend() -> &'static dyn LockBackend {
    static BACKEND: OnceLock<&'static dyn LockBackend> = OnceLock::new();
    *BACKEND.get_or_init(|| {
        #[cfg(unix)]
        let backend: &'static dyn LockBackend = &FlockBackend;
        #[cfg(not(unix))]
        let backend: &'static dyn LockBackend = &Fs2Backend;
        tracing::debug!(target: "rollsink", backend = backend.name(), "selected file lock backend");
        backend
    })
}

/// A held cross-process lock. Released on [`ProcessLock::release`] or drop,
/// whichever comes first, including during unwinding.
pub struct ProcessLock {
    file: File,
    path: PathBuf,
    backend: &'static dyn LockBackend,
}

impl ProcessLock {
    /// Block until the lock named by `path` is held, creating the lock file if
    /// it does not exist yet.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self, RollSinkError> {
        Self::acquire_with(path, platform_backend())
    }

    /// Like [`ProcessLock::acquire`] but with an explicit backend.
    pub fn acquire_with<P: AsRef<Path>>(
        path: P,
        backend: &'static dyn LockBackend,
    ) -> Result<Self, RollSinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| RollSinkError::LockFailed(path.clone(), err.to_string()))?;
        backend
            .lock(&file)
            .map_err(|err| RollSinkError::LockFailed(path.clone(), err.to_string()))?;
        Ok(ProcessLock { file, path, backend })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock now.
    pub fn release(self) {}
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well; unlocking explicitly
        // just makes the release point deterministic.
        if let Err(err) = self.backend.unlock(&self.file) {
            tracing::warn!(
                target: "rollsink",
                path = %self.path.display(),
                error = %err,
                "failed to unlock cleanup lock"
            );
        }
    }
}

impl fmt::Debug for ProcessLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessLock")
            .field("path", &self.path)
            .field("backend", &self.backend.name())
            .finish()
    }
}
