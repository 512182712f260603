use {
    rollsink::{RetentionCleaner, RotatingFileSinkBuilder, TimeZone},
    std::{fs, path::Path, thread, time::Duration},
};

fn rotation_files(dir: &Path, base_filename: &str) -> Vec<String> {
    let prefix = format!("{base_filename}.");
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(&prefix))
        .collect();
    names.sort();
    names
}

#[test]
fn writes_reach_todays_file_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let sink = RotatingFileSinkBuilder::new(tmp.path(), "app.log")
        .time_zone(TimeZone::UTC)
        .flush_period(Duration::from_secs(3600))
        .build()
        .unwrap();
    let today = sink.current_path();
    fs::write(&today, "prior\n").unwrap();

    sink.write("a");
    sink.write("b");
    sink.write("c");
    sink.flush().unwrap();

    assert_eq!(fs::read_to_string(&today).unwrap(), "prior\na\nb\nc\n");
}

#[test]
fn retention_keeps_the_two_newest_days() {
    let tmp = tempfile::tempdir().unwrap();
    for day in ["2022-12-27", "2022-12-28", "2022-12-29", "2022-12-30"] {
        fs::write(tmp.path().join(format!("app.log.{day}")), "x\n").unwrap();
    }

    RetentionCleaner::new(tmp.path(), "app.log", 2).unwrap().cleanup().unwrap();

    assert_eq!(
        rotation_files(tmp.path(), "app.log"),
        vec!["app.log.2022-12-29", "app.log.2022-12-30"]
    );
}

#[test]
fn flushing_sink_never_selects_lookalike_files() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("app.log.notadate"), "x\n").unwrap();
    fs::write(tmp.path().join("app.logx.2022-12-29"), "x\n").unwrap();
    fs::write(tmp.path().join("app.log.2001-01-01"), "x\n").unwrap();

    let sink = RotatingFileSinkBuilder::new(tmp.path(), "app.log")
        .retention_count(1)
        .flush_period(Duration::from_secs(3600))
        .build()
        .unwrap();
    sink.write("today");
    sink.flush().unwrap();

    assert!(tmp.path().join("app.log.notadate").exists());
    assert!(tmp.path().join("app.logx.2022-12-29").exists());
    assert!(!tmp.path().join("app.log.2001-01-01").exists());
    assert!(sink.current_path().exists());
}

#[test]
fn sinks_sharing_a_file_in_one_process() {
    let tmp = tempfile::tempdir().unwrap();
    let build = || {
        RotatingFileSinkBuilder::new(tmp.path(), "shared.log")
            .time_zone(TimeZone::UTC)
            .retention_count(3)
            .flush_period(Duration::from_millis(20))
            .build()
            .unwrap()
    };
    let sinks = [build(), build(), build()];

    let handles: Vec<_> = sinks
        .iter()
        .enumerate()
        .map(|(n, sink)| {
            let sink = sink.clone();
            thread::spawn(move || {
                for i in 0..300 {
                    sink.write(format!("sink{n} {i}"));
                    if i % 50 == 0 {
                        thread::sleep(Duration::from_millis(5));
                    }
                }
                sink.flush().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let contents = fs::read_to_string(sinks[0].current_path()).unwrap();
    for n in 0..3 {
        let seen: Vec<usize> = contents
            .lines()
            .filter_map(|l| l.strip_prefix(&format!("sink{n} ")))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(seen, (0..300).collect::<Vec<_>>(), "sink{n} lines out of order or missing");
    }
}
