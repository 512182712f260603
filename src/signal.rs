//! Final flush on catchable termination signals.
//!
//! `SIGTERM`, `SIGINT` and `SIGHUP` end a process without running `atexit`
//! hooks. For each of them still at its default disposition a handler is
//! installed that only writes the signal number into a pipe. A watcher thread
//! blocked on the other end flushes every registered sink, restores the
//! default disposition and raises the signal again, so the process still dies
//! the way it would have without us.

use {
    crate::{scheduler::FlushScheduler, RollSinkError},
    parking_lot::Mutex,
    std::{
        io, mem, ptr,
        sync::atomic::{AtomicI32, Ordering},
        thread,
    },
};

/// Signals whose default action terminates the process and that can be
/// caught.
pub(crate) const FLUSH_SIGNALS: [libc::c_int; 3] = [libc::SIGTERM, libc::SIGINT, libc::SIGHUP];

/// Write end of the notification pipe, `-1` until installed.
static NOTIFY_FD: AtomicI32 = AtomicI32::new(-1);
/// Process the watcher thread belongs to. A forked child inherits the handler
/// but not the thread.
static WATCHED_PID: AtomicI32 = AtomicI32::new(0);
static INSTALLED_FOR: Mutex<Option<libc::pid_t>> = parking_lot::const_mutex(None);

pub(crate) fn install() -> Result<(), RollSinkError> {
    let mut installed_for = INSTALLED_FOR.lock();
    // SAFETY: getpid has no preconditions.
    let pid = unsafe { libc::getpid() };
    if *installed_for == Some(pid) {
        return Ok(());
    }

    let (read_fd, write_fd) = notify_pipe()?;
    thread::Builder::new()
        .name("rollsink-signal".to_string())
        .spawn(move || watch(read_fd))
        .map_err(|err| RollSinkError::SignalSetupFailed(err.to_string()))?;
    NOTIFY_FD.store(write_fd, Ordering::SeqCst);
    WATCHED_PID.store(pid, Ordering::SeqCst);
    *installed_for = Some(pid);

    for signal in FLUSH_SIGNALS {
        install_handler(signal)?;
    }
    Ok(())
}

fn last_os_error(call: &str) -> RollSinkError {
    RollSinkError::SignalSetupFailed(format!("{call}: {}", io::Error::last_os_error()))
}

fn notify_pipe() -> Result<(libc::c_int, libc::c_int), RollSinkError> {
    let mut fds: [libc::c_int; 2] = [-1, -1];
    // SAFETY: `fds` has room for the two descriptors pipe(2) fills in.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(last_os_error("pipe"));
    }
    let [read_fd, write_fd] = fds;
    // SAFETY: both descriptors were just returned by pipe(2) and are owned here.
    unsafe {
        libc::fcntl(read_fd, libc::F_SETFD, libc::FD_CLOEXEC);
        libc::fcntl(write_fd, libc::F_SETFD, libc::FD_CLOEXEC);
        // A handler must never block on a full pipe.
        libc::fcntl(write_fd, libc::F_SETFL, libc::O_NONBLOCK);
    }
    Ok((read_fd, write_fd))
}

fn flush_handler() -> libc::sighandler_t {
    on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t
}

/// Current disposition of `signal`.
fn disposition(signal: libc::c_int) -> Result<libc::sighandler_t, RollSinkError> {
    // SAFETY: an all-zero `sigaction` is a valid out-parameter.
    let mut current: libc::sigaction = unsafe { mem::zeroed() };
    // SAFETY: a null new action only queries the current one.
    if unsafe { libc::sigaction(signal, ptr::null(), &mut current) } != 0 {
        return Err(last_os_error("sigaction"));
    }
    Ok(current.sa_sigaction)
}

fn install_handler(signal: libc::c_int) -> Result<(), RollSinkError> {
    let current = disposition(signal)?;
    if current != libc::SIG_DFL && current != flush_handler() {
        tracing::debug!(target: "rollsink", signal, "signal already handled by the host, not flushing on it");
        return Ok(());
    }

    // SAFETY: an all-zero `sigaction` is a valid starting value.
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = flush_handler();
    action.sa_flags = libc::SA_RESTART;
    // SAFETY: `action` is a live, exclusively borrowed `sigaction`.
    unsafe { libc::sigemptyset(&mut action.sa_mask) };
    // SAFETY: `on_signal` only makes async-signal-safe calls.
    if unsafe { libc::sigaction(signal, &action, ptr::null_mut()) } != 0 {
        return Err(last_os_error("sigaction"));
    }
    Ok(())
}

extern "C" fn on_signal(signal: libc::c_int) {
    let fd = NOTIFY_FD.load(Ordering::SeqCst);
    // SAFETY: getpid, write, signal and raise are all async-signal-safe.
    unsafe {
        if fd >= 0 && libc::getpid() == WATCHED_PID.load(Ordering::SeqCst) {
            let byte = signal as u8;
            if libc::write(fd, (&byte as *const u8).cast(), 1) == 1 {
                return;
            }
        }
        // No watcher in this process: die of the signal right away.
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}

fn watch(read_fd: libc::c_int) {
    let mut byte = 0u8;
    loop {
        // SAFETY: `byte` is a one-byte buffer and `read_fd` is never closed.
        let n = unsafe { libc::read(read_fd, (&mut byte as *mut u8).cast(), 1) };
        match n {
            1 => break,
            0 => return,
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::warn!(target: "rollsink", error = %err, "signal flush watcher stopped");
                return;
            }
        }
    }

    let signal = libc::c_int::from(byte);
    tracing::debug!(target: "rollsink", signal, "flushing log sinks before exiting on signal");
    FlushScheduler::global().flush_all();

    // SAFETY: plain libc calls restoring the default action; raise delivers the
    // signal to this thread before returning, which ends the process.
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}
