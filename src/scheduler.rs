//! The process-wide flush thread.
//!
//! Every sink built in a process registers with one [`FlushScheduler`]. The
//! first registration spawns a detached background thread that wakes once
//! per tick and flushes each sink whose flush period has come round. Every
//! registration also wakes the thread so the tick follows the shortest period
//! registered so far. The thread is never joined and does not keep the process
//! alive.
//!
//! Lines still queued when the process ends are written by a final flush:
//!
//! * an `atexit` hook, installed with the first registration, covers returning
//!   from `main` and `std::process::exit`;
//! * on Unix, `SIGTERM`, `SIGINT` and `SIGHUP` left at their default action
//!   flush before the process dies of them (see
//!   [`FlushScheduler::install_signal_flush`]);
//! * a [`FlushGuard`] held by the host covers scoped teardown, including
//!   unwinding out of `main`.
//!
//! `SIGKILL` and `abort` leave no chance to flush, so at most one flush period
//! of lines can be lost that way.

use {
    crate::sink::{SinkShared, DEFAULT_FLUSH_PERIOD},
    parking_lot::{Condvar, Mutex},
    std::{
        panic::{self, AssertUnwindSafe},
        process,
        sync::{Arc, Once, OnceLock},
        thread,
        time::{Duration, Instant},
    },
};

static SCHEDULER: OnceLock<FlushScheduler> = OnceLock::new();

/// Owns the registry of every sink in the process and the thread that
/// flushes them.
pub struct FlushScheduler {
    /// Append-only; sinks stay registered for the life of the process.
    sinks: Mutex<Vec<Arc<SinkShared>>>,
    /// Process id that spawned the flush thread. A forked child sees its
    /// parent's id here and spawns a thread of its own.
    started_by: Mutex<Option<u32>>,
    /// Set by registration, cleared by the flush thread once it has seen it.
    registered_since_wait: Mutex<bool>,
    wake: Condvar,
    exit_hook: Once,
}

impl FlushScheduler {
    fn new() -> Self {
        FlushScheduler {
            sinks: Mutex::new(Vec::new()),
            started_by: Mutex::new(None),
            registered_since_wait: Mutex::new(false),
            wake: Condvar::new(),
            exit_hook: Once::new(),
        }
    }

    /// The scheduler of this process.
    pub fn global() -> &'static FlushScheduler {
        SCHEDULER.get_or_init(FlushScheduler::new)
    }

    pub(crate) fn register(&'static self, sink: Arc<SinkShared>) {
        self.sinks.lock().push(sink);
        self.install_exit_hook();
        #[cfg(unix)]
        {
            if let Err(err) = self.install_signal_flush() {
                tracing::warn!(target: "rollsink", error = %err, "failed to install signal flush");
            }
        }
        *self.registered_since_wait.lock() = true;
        self.wake.notify_all();
        self.ensure_started();
    }

    /// Flush every sink before `SIGTERM`, `SIGINT` or `SIGHUP` ends the
    /// process.
    ///
    /// Registration calls this, so hosts rarely need to. Only signals still at
    /// their default disposition are taken over; after the flush the default
    /// is restored and the signal raised again, so the exit status is the one
    /// the signal would have produced. Signals the host handles or ignores are
    /// left alone, and a host that installs its own handler later replaces
    /// this one.
    ///
    /// Idempotent within a process. A forked child installs its own watcher.
    #[cfg(unix)]
    pub fn install_signal_flush(&self) -> Result<(), crate::RollSinkError> {
        crate::signal::install()
    }

    /// Number of sinks registered in this process.
    pub fn registered(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Flush every registered sink now, regardless of flush periods.
    ///
    /// Failures are reported through `tracing` and do not stop the remaining
    /// sinks from being flushed.
    pub fn flush_all(&self) {
        for sink in self.snapshot() {
            flush_one(&sink);
        }
    }

    /// The longest the flush thread waits between passes: the shortest
    /// flush period of any registered sink.
    fn tick(&self) -> Duration {
        self.sinks
            .lock()
            .iter()
            .map(|sink| sink.flush_period())
            .min()
            .unwrap_or(DEFAULT_FLUSH_PERIOD)
    }

    fn flush_due(&self, tick: Duration) {
        for sink in self.snapshot() {
            if sink.is_due(Instant::now(), tick) {
                flush_one(&sink);
            }
        }
    }

    /// Flushing happens on a copy of the registry so file I/O never blocks
    /// sink registration.
    fn snapshot(&self) -> Vec<Arc<SinkShared>> {
        self.sinks.lock().clone()
    }

    fn ensure_started(&'static self) {
        let pid = process::id();
        let mut started_by = self.started_by.lock();
        if *started_by == Some(pid) {
            return;
        }

        let spawned = thread::Builder::new()
            .name("rollsink-flush".to_string())
            .spawn(move || self.run());
        match spawned {
            Ok(_) => *started_by = Some(pid),
            Err(err) => {
                tracing::warn!(target: "rollsink", error = %err, "failed to spawn log flush thread");
            }
        }
    }

    fn run(&self) {
        loop {
            let tick = self.tick();
            {
                let mut registered = self.registered_since_wait.lock();
                if !*registered {
                    self.wake.wait_for(&mut registered, tick);
                }
                *registered = false;
            }
            self.flush_due(self.tick());
        }
    }

    fn install_exit_hook(&self) {
        self.exit_hook.call_once(|| {
            // SAFETY: `flush_at_exit` is a plain `extern "C" fn()` that never
            // unwinds across the FFI boundary.
            let rc = unsafe { libc::atexit(flush_at_exit) };
            if rc != 0 {
                tracing::warn!(target: "rollsink", "failed to register exit flush hook");
            }
        });
    }
}

fn flush_one(sink: &SinkShared) {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.flush())) {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            tracing::warn!(target: "rollsink", error = %err, "failed to flush log lines");
        }
        Err(_) => {
            tracing::warn!(target: "rollsink", "panic while flushing log lines");
        }
    }
}

extern "C" fn flush_at_exit() {
    let _ = panic::catch_unwind(|| {
        if let Some(scheduler) = SCHEDULER.get() {
            scheduler.flush_all();
        }
    });
}

/// Flushes every registered sink when dropped.
///
/// Hold one for the lifetime of `main` (or any scope whose end should write
/// out everything logged so far):
///
/// ```
/// fn main() {
///     let _flush = rollsink::FlushGuard::new();
///     // build sinks, log...
/// }
/// ```
#[must_use = "the final flush happens when the guard is dropped"]
#[derive(Debug, Default)]
pub struct FlushGuard {
    _priv: (),
}

impl FlushGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FlushScheduler::global().flush_all();
    }
}
