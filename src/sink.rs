use {
    crate::{
        queue::LineQueue,
        retention::RetentionCleaner,
        rotation::{rotation_file_name, TimeZone},
        scheduler::FlushScheduler,
        RollSinkError,
    },
    chrono::{DateTime, Utc},
    parking_lot::Mutex,
    std::{
        fmt,
        fs,
        io::Write as _,
        path::{Path, PathBuf},
        sync::Arc,
        time::{Duration, Instant},
    },
};

#[cfg(unix)]
use std::{fs::Permissions, os::unix::fs::PermissionsExt};

/// Number of rotation files kept when not configured.
pub const DEFAULT_RETENTION_COUNT: usize = 10;

/// How often buffered lines are written out when not configured.
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(1);

/// Configuration of one sink. Fixed once the sink is built.
#[derive(Debug, Clone)]
struct SinkMeta {
    /// The directory holding the rotation files and the cleanup lock.
    directory: PathBuf,
    /// The name rotation keys are appended to.
    base_filename: String,
    /// How many rotation files survive a cleanup pass.
    retention_count: usize,
    /// Minimum time between background flushes of this sink.
    flush_period: Duration,
    /// The time zone deciding which day a flush belongs to.
    time_zone: TimeZone,
    /// Unix mode applied to rotation files, e.g. `0o640`.
    file_mode: Option<u32>,
}

impl SinkMeta {
    fn new<P: AsRef<Path>>(directory: P, base_filename: &str) -> Self {
        SinkMeta {
            directory: directory.as_ref().to_path_buf(),
            base_filename: base_filename.to_string(),
            retention_count: DEFAULT_RETENTION_COUNT,
            flush_period: DEFAULT_FLUSH_PERIOD,
            time_zone: TimeZone::default(),
            file_mode: None,
        }
    }

    fn validate(&self) -> Result<(), RollSinkError> {
        let name = self.base_filename.as_str();
        if name.is_empty() || name == "." || name == ".." {
            return Err(RollSinkError::InvalidConfig(format!(
                "base filename '{name}' is not a file name"
            )));
        }
        if name.contains(['/', '\\']) {
            return Err(RollSinkError::InvalidConfig(format!(
                "base filename '{name}' must not contain path separators"
            )));
        }
        if self.retention_count == 0 {
            return Err(RollSinkError::InvalidConfig(
                "retention count must be at least 1".to_string(),
            ));
        }
        if self.flush_period.is_zero() {
            return Err(RollSinkError::InvalidConfig(
                "flush period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the rotation file that a flush at `now` appends to.
    fn log_path_at(&self, now: DateTime<Utc>) -> PathBuf {
        let key = self.time_zone.rotation_key_at(now);
        self.directory.join(rotation_file_name(&self.base_filename, &key))
    }

    /// Open `log_path` for appending, creating it (and its directory, should
    /// it have been removed since the sink was built) when missing.
    fn open_log_file(&self, log_path: &Path) -> Result<fs::File, RollSinkError> {
        let mut open_options = fs::OpenOptions::new();
        open_options.append(true).create(true);

        let mut open_res = open_options.open(log_path);
        if open_res.is_err() {
            if let Some(parent) = log_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| RollSinkError::CreateDirectoryFailed(parent.to_path_buf(), err.to_string()))?;
                open_res = open_options.open(log_path);
            }
        }

        let log_file =
            open_res.map_err(|err| RollSinkError::CreateFileFailed(log_path.to_path_buf(), err.to_string()))?;

        self.set_permissions(log_path)?;

        Ok(log_file)
    }

    /// Append every line, each terminated by `\n`, in a single write.
    fn append(&self, log_path: &Path, lines: &[String]) -> Result<(), RollSinkError> {
        let mut buffer = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            buffer.push_str(line);
            buffer.push('\n');
        }

        let mut log_file = self.open_log_file(log_path)?;
        log_file
            .write_all(buffer.as_bytes())
            .map_err(|err| RollSinkError::WriteFailed(log_path.to_path_buf(), err.to_string()))
    }

    /// Apply the configured file mode, if any.
    ///
    /// Only Unix-like systems have a mode to set; elsewhere a configured mode
    /// is reported and otherwise ignored.
    fn set_permissions(&self, path: &Path) -> Result<(), RollSinkError> {
        if let Some(mode) = self.file_mode {
            #[cfg(unix)]
            {
                fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|err| {
                    RollSinkError::SetFilePermissionsError {
                        path: path.to_path_buf(),
                        error: err.to_string(),
                    }
                })?
            }
            #[cfg(not(unix))]
            {
                let _ = mode;
                tracing::warn!(
                    target: "rollsink",
                    path = %path.display(),
                    "setting file permissions is not supported on this platform"
                );
            }
        }
        Ok(())
    }
}

/// State shared by every handle of one sink and by the flush scheduler.
pub(crate) struct SinkShared {
    meta: SinkMeta,
    queue: LineQueue,
    cleaner: RetentionCleaner,
    /// Serializes drain-and-append so batches reach the file in drain order.
    flush_order: Mutex<()>,
    last_flush: Mutex<Instant>,
}

impl SinkShared {
    pub(crate) fn push(&self, line: String) {
        self.queue.push(line);
    }

    pub(crate) fn flush_period(&self) -> Duration {
        self.meta.flush_period
    }

    /// Whether waiting another `tick` before flushing would reach or overshoot
    /// this sink's flush period.
    pub(crate) fn is_due(&self, now: Instant, tick: Duration) -> bool {
        let elapsed = now.saturating_duration_since(*self.last_flush.lock());
        elapsed + tick >= self.meta.flush_period
    }

    pub(crate) fn flush(&self) -> Result<usize, RollSinkError> {
        self.flush_at(Utc::now())
    }

    fn flush_at(&self, now: DateTime<Utc>) -> Result<usize, RollSinkError> {
        let written = {
            let _order = self.flush_order.lock();
            *self.last_flush.lock() = Instant::now();

            let lines = self.queue.drain_all();
            if lines.is_empty() {
                return Ok(0);
            }
            let log_path = self.meta.log_path_at(now);
            self.meta.append(&log_path, &lines)?;
            lines.len()
        };

        self.cleaner.cleanup()?;
        Ok(written)
    }
}

/// A handle to a buffered, date-rotating log file.
///
/// [`write`](RotatingFileSink::write) only queues the line in memory. A
/// process-wide background thread appends queued lines to
/// `{directory}/{base_filename}.{YYYY-MM-DD}` once per flush period, and a
/// final flush runs when the process exits. After every non-empty flush the
/// oldest rotation files beyond the retention count are deleted, under a
/// lock file shared with any other process logging into the same directory
/// under the same base filename.
///
/// Handles are cheap to clone and all clones feed the same queue. Used as an
/// `io::Write`, `write` queues one line per newline-separated record and
/// `flush` writes the queue out synchronously.
///
/// # Examples
/// ```
/// use rollsink::RotatingFileSinkBuilder;
///
/// # fn main() -> Result<(), rollsink::RollSinkError> {
/// # let dir = tempfile::tempdir()?;
/// let sink = RotatingFileSinkBuilder::new(dir.path(), "app.log")
///     .retention_count(7)
///     .build()?;
///
/// sink.write("[INFO] service started");
/// sink.flush()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RotatingFileSink {
    pub(crate) shared: Arc<SinkShared>,
}

impl RotatingFileSink {
    /// Queue one formatted line. Never blocks on I/O and never fails.
    pub fn write<S: Into<String>>(&self, line: S) {
        self.shared.push(line.into());
    }

    /// Write out everything queued so far, then prune old rotation files.
    ///
    /// Returns the number of lines written. With nothing queued this touches
    /// no file and runs no cleanup.
    pub fn flush(&self) -> Result<usize, RollSinkError> {
        self.shared.flush()
    }

    pub fn directory(&self) -> &Path {
        &self.shared.meta.directory
    }

    pub fn base_filename(&self) -> &str {
        &self.shared.meta.base_filename
    }

    pub fn retention_count(&self) -> usize {
        self.shared.meta.retention_count
    }

    pub fn flush_period(&self) -> Duration {
        self.shared.meta.flush_period
    }

    pub fn time_zone(&self) -> TimeZone {
        self.shared.meta.time_zone
    }

    /// The file a flush would append to right now.
    pub fn current_path(&self) -> PathBuf {
        self.shared.meta.log_path_at(Utc::now())
    }

    /// Number of lines waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }
}

impl fmt::Debug for RotatingFileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingFileSink")
            .field("directory", &self.shared.meta.directory)
            .field("base_filename", &self.shared.meta.base_filename)
            .field("retention_count", &self.shared.meta.retention_count)
            .field("flush_period", &self.shared.meta.flush_period)
            .field("pending", &self.shared.queue.len())
            .finish()
    }
}

/// Provides a fluent interface for configuring a [`RotatingFileSink`].
///
/// # Default Configuration
///
/// * Keep the 10 newest rotation files
/// * Flush once per second
/// * Local system time zone for day boundaries
/// * Permissions left to the process umask
///
/// # Examples
/// ```
/// use {rollsink::{RotatingFileSinkBuilder, TimeZone}, std::time::Duration};
///
/// # fn main() -> Result<(), rollsink::RollSinkError> {
/// # let dir = tempfile::tempdir()?;
/// let sink = RotatingFileSinkBuilder::new(dir.path(), "worker.log")
///     .retention_count(30)
///     .flush_period(Duration::from_millis(500))
///     .time_zone(TimeZone::UTC)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RotatingFileSinkBuilder {
    meta: SinkMeta,
}

impl RotatingFileSinkBuilder {
    /// Create a new sink builder.
    /// # Arguments
    /// * `directory` - Where rotation files are written; created if absent.
    /// * `base_filename` - The name rotation keys are appended to.
    pub fn new<P: AsRef<Path>>(directory: P, base_filename: &str) -> Self {
        RotatingFileSinkBuilder {
            meta: SinkMeta::new(directory, base_filename),
        }
    }

    /// Set how many rotation files survive a cleanup pass.
    pub fn retention_count(self, retention_count: usize) -> Self {
        Self {
            meta: SinkMeta {
                retention_count,
                ..self.meta
            },
        }
    }

    /// Set the minimum time between background flushes.
    pub fn flush_period(self, flush_period: Duration) -> Self {
        Self {
            meta: SinkMeta {
                flush_period,
                ..self.meta
            },
        }
    }

    /// Set the time zone used to pick the rotation key.
    pub fn time_zone(self, time_zone: TimeZone) -> Self {
        Self {
            meta: SinkMeta { time_zone, ..self.meta },
        }
    }

    /// Set the file permissions for rotation files (Unix-like systems only),
    /// in octal notation like `chmod`, e.g. `0o640`.
    pub fn file_mode(self, mode: u32) -> Self {
        Self {
            meta: SinkMeta {
                file_mode: Some(mode),
                ..self.meta
            },
        }
    }

    /// Build the sink and register it with the process flush scheduler.
    ///
    /// Fails when the configuration is invalid or the directory cannot be
    /// created. Once built, I/O problems during flushes are reported through
    /// `tracing` and never reach callers of `write`.
    pub fn build(self) -> Result<RotatingFileSink, RollSinkError> {
        let sink = self.build_unregistered()?;
        FlushScheduler::global().register(Arc::clone(&sink.shared));
        Ok(sink)
    }

    pub(crate) fn build_unregistered(self) -> Result<RotatingFileSink, RollSinkError> {
        self.meta.validate()?;
        fs::create_dir_all(&self.meta.directory)
            .map_err(|err| RollSinkError::CreateDirectoryFailed(self.meta.directory.clone(), err.to_string()))?;

        let cleaner = RetentionCleaner::new(
            &self.meta.directory,
            &self.meta.base_filename,
            self.meta.retention_count,
        )?;
        Ok(RotatingFileSink {
            shared: Arc::new(SinkShared {
                meta: self.meta,
                queue: LineQueue::new(),
                cleaner,
                flush_order: Mutex::new(()),
                last_flush: Mutex::new(Instant::now()),
            }),
        })
    }
}
