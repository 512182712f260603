//! Several OS processes logging into one directory.
//!
//! Each test re-runs this test binary, filtered down to `child_writer`, with
//! the child's job described in environment variables. Run directly (no
//! environment), `child_writer` does nothing.
#![cfg(unix)]

use {
    rollsink::{RotatingFileSinkBuilder, TimeZone},
    std::{
        env, fs,
        os::unix::process::ExitStatusExt,
        path::Path,
        process::{Child, Command, Stdio},
        thread,
        time::{Duration, Instant},
    },
};

const CHILD_DIR: &str = "ROLLSINK_TEST_CHILD_DIR";
const CHILD_TAG: &str = "ROLLSINK_TEST_CHILD_TAG";
const CHILD_LINES: &str = "ROLLSINK_TEST_CHILD_LINES";
const CHILD_PERIOD_MS: &str = "ROLLSINK_TEST_CHILD_PERIOD_MS";
const CHILD_RETENTION: &str = "ROLLSINK_TEST_CHILD_RETENTION";
/// When set, the child creates this file once its lines are queued and then
/// waits to be killed instead of exiting.
const CHILD_READY: &str = "ROLLSINK_TEST_CHILD_READY";

const BASE_FILENAME: &str = "proc.log";

#[test]
fn child_writer() {
    let Ok(dir) = env::var(CHILD_DIR) else {
        return;
    };
    let tag = env::var(CHILD_TAG).unwrap();
    let lines: usize = env::var(CHILD_LINES).unwrap().parse().unwrap();
    let period_ms: u64 = env::var(CHILD_PERIOD_MS).unwrap().parse().unwrap();
    let retention: usize = env::var(CHILD_RETENTION).unwrap().parse().unwrap();

    if env::var_os(CHILD_READY).is_some() {
        // Start from the default dispositions whatever the test runner
        // inherited, e.g. SIGHUP ignored under nohup.
        for signal in [libc::SIGTERM, libc::SIGHUP] {
            // SAFETY: no handler is involved in restoring the default action.
            unsafe { libc::signal(signal, libc::SIG_DFL) };
        }
    }

    let sink = RotatingFileSinkBuilder::new(dir, BASE_FILENAME)
        .time_zone(TimeZone::UTC)
        .retention_count(retention)
        .flush_period(Duration::from_millis(period_ms))
        .build()
        .unwrap();

    for i in 0..lines {
        sink.write(format!("{tag} {i}"));
        if period_ms < 1000 && i % 100 == 99 {
            thread::sleep(Duration::from_millis(period_ms));
        }
    }

    if let Ok(ready) = env::var(CHILD_READY) {
        fs::write(ready, "").unwrap();
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }

    // Leave without flushing; the exit hook has to write what is left.
    std::process::exit(0);
}

struct ChildJob<'a> {
    dir: &'a Path,
    tag: String,
    lines: usize,
    period_ms: u64,
    retention: usize,
    ready: Option<&'a Path>,
}

fn spawn(job: ChildJob<'_>) -> Child {
    let mut command = Command::new(env::current_exe().unwrap());
    command
        .args(["--exact", "child_writer", "--nocapture", "--test-threads=1"])
        .env(CHILD_DIR, job.dir)
        .env(CHILD_TAG, &job.tag)
        .env(CHILD_LINES, job.lines.to_string())
        .env(CHILD_PERIOD_MS, job.period_ms.to_string())
        .env(CHILD_RETENTION, job.retention.to_string())
        .stdout(Stdio::null());
    if let Some(ready) = job.ready {
        command.env(CHILD_READY, ready);
    }
    command.spawn().unwrap()
}

fn wait_all(children: Vec<Child>) {
    for mut child in children {
        assert!(child.wait().unwrap().success());
    }
}

/// All lines from every rotation file in `dir`.
fn logged_lines(dir: &Path) -> Vec<String> {
    let prefix = format!("{BASE_FILENAME}.");
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(&prefix))
        .collect();
    names.sort();
    names
        .iter()
        .flat_map(|n| {
            fs::read_to_string(dir.join(n))
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn indices_for(lines: &[String], tag: &str) -> Vec<usize> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix(&format!("{tag} ")))
        .map(|i| i.parse().unwrap())
        .collect()
}

#[test]
fn exit_hook_writes_lines_from_a_short_lived_process() {
    let tmp = tempfile::tempdir().unwrap();
    let child = spawn(ChildJob {
        dir: tmp.path(),
        tag: "quick".to_string(),
        lines: 250,
        period_ms: 3_600_000,
        retention: 10,
        ready: None,
    });
    wait_all(vec![child]);

    let lines = logged_lines(tmp.path());
    assert_eq!(indices_for(&lines, "quick"), (0..250).collect::<Vec<_>>());
}

/// Queue lines in a child with an hour-long flush period, kill it with
/// `signal`, and check every line reached the file anyway.
fn assert_signal_flushes_queued_lines(signal: libc::c_int, tag: &str) {
    let tmp = tempfile::tempdir().unwrap();
    let ready = tmp.path().join("ready");
    let mut child = spawn(ChildJob {
        dir: tmp.path(),
        tag: tag.to_string(),
        lines: 200,
        period_ms: 3_600_000,
        retention: 10,
        ready: Some(&ready),
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    while !ready.exists() {
        assert!(Instant::now() < deadline, "child never queued its lines");
        thread::sleep(Duration::from_millis(20));
    }
    // SAFETY: sending a signal to our own child process.
    assert_eq!(unsafe { libc::kill(child.id() as libc::pid_t, signal) }, 0);

    let status = child.wait().unwrap();
    assert_eq!(status.signal(), Some(signal), "{status:?}");
    let lines = logged_lines(tmp.path());
    assert_eq!(indices_for(&lines, tag), (0..200).collect::<Vec<_>>());
}

#[test]
fn sigterm_flushes_queued_lines() {
    assert_signal_flushes_queued_lines(libc::SIGTERM, "term");
}

#[test]
fn sighup_flushes_queued_lines() {
    assert_signal_flushes_queued_lines(libc::SIGHUP, "hup");
}

#[test]
fn concurrent_processes_lose_no_lines() {
    let tmp = tempfile::tempdir().unwrap();
    let children = (0..4)
        .map(|n| {
            spawn(ChildJob {
                dir: tmp.path(),
                tag: format!("p{n}"),
                lines: 1000,
                period_ms: 10,
                retention: 10,
                ready: None,
            })
        })
        .collect();
    wait_all(children);

    let lines = logged_lines(tmp.path());
    assert_eq!(lines.len(), 4000);
    for n in 0..4 {
        assert_eq!(
            indices_for(&lines, &format!("p{n}")),
            (0..1000).collect::<Vec<_>>(),
            "process p{n} lines out of order or missing"
        );
    }
}

#[test]
fn racing_cleanups_keep_exactly_the_retention_count() {
    let tmp = tempfile::tempdir().unwrap();
    for day in 1..=28 {
        fs::write(tmp.path().join(format!("{BASE_FILENAME}.2001-02-{day:02}")), "old\n").unwrap();
    }
    fs::write(tmp.path().join(format!("{BASE_FILENAME}.notadate")), "keep\n").unwrap();

    let children = (0..4)
        .map(|n| {
            spawn(ChildJob {
                dir: tmp.path(),
                tag: format!("c{n}"),
                lines: 300,
                period_ms: 10,
                retention: 3,
                ready: None,
            })
        })
        .collect();
    wait_all(children);

    let mut remaining: Vec<String> = fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(BASE_FILENAME))
        .collect();
    remaining.sort();

    // The two newest old days plus today's file, and the unrelated file.
    assert_eq!(remaining.len(), 4, "{remaining:?}");
    assert_eq!(remaining[0], format!("{BASE_FILENAME}.2001-02-27"));
    assert_eq!(remaining[1], format!("{BASE_FILENAME}.2001-02-28"));
    assert_eq!(remaining[3], format!("{BASE_FILENAME}.notadate"));
    assert!(tmp.path().join(format!("_delete_{BASE_FILENAME}.lock")).exists());

    let lines = logged_lines(tmp.path());
    for n in 0..4 {
        assert_eq!(indices_for(&lines, &format!("c{n}")), (0..300).collect::<Vec<_>>());
    }
}
