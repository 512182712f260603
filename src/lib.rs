//! # rollsink
//!
//! rollsink is a log file sink that several processes can share. Lines are
//! queued in memory by the caller, written out in batches by a background
//! thread, and land in one file per day named `{base_filename}.{YYYY-MM-DD}`.
//! Whichever process flushes also prunes the oldest daily files beyond a
//! retention count, under a lock file in the log directory, so any number of
//! processes can log into the same directory with the same base filename.
//!
//! * Writing never blocks on disk and never fails.
//! * A flush happens at least once per flush period (one second by default)
//!   and once more when the process exits, including on `SIGTERM`, `SIGINT`
//!   and `SIGHUP` on Unix.
//! * Day boundaries follow the local, UTC, or a fixed time zone.
//! * **The sink plugs into `tracing_subscriber::fmt` as a writer**, or takes
//!   already formatted lines directly.
//!
//! ## Example
//!
//! ```rust
//! use {
//!    rollsink::{FlushGuard, RotatingFileSinkBuilder, TimeZone},
//!    tracing_subscriber::util::SubscriberInitExt,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #  let dir = tempfile::tempdir()?;
//! #  let logs = dir.path();
//!    let _flush = FlushGuard::new();
//!    let sink = RotatingFileSinkBuilder::new(logs, "tracing.log")
//!        .retention_count(7)
//!        .time_zone(TimeZone::UTC)
//!        .build()?;
//!    tracing_subscriber::fmt()
//!        .with_writer(sink)
//!        .with_ansi(false)
//!        .with_target(false)
//!        .finish()
//!        .try_init()?;
//!
//!    tracing::info!("This is an info message");
//!    tracing::warn!("This is a warning message");
//!    tracing::error!("This is an error message");
//!
//!    Ok(())
//! }
//! ```

mod config;
mod error;
pub mod lock;
mod queue;
mod retention;
mod rotation;
mod scheduler;
#[cfg(unix)]
mod signal;
mod sink;
mod writer;

pub use {
    config::{SinkConfig, TimeZoneConfig},
    error::RollSinkError,
    lock::ProcessLock,
    queue::LineQueue,
    retention::{lock_file_name, RetentionCleaner},
    rotation::{rotation_file_name, RotationPattern, TimeZone, ROTATION_KEY_FORMAT},
    scheduler::{FlushGuard, FlushScheduler},
    sink::{RotatingFileSink, RotatingFileSinkBuilder, DEFAULT_FLUSH_PERIOD, DEFAULT_RETENTION_COUNT},
};
