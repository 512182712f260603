use {
    rollsink::RotatingFileSinkBuilder,
    std::{env, process::Command, thread, time::Duration},
};

const WORKERS: usize = 4;

/// Start several copies of this program that all log into the same file and
/// share the cleanup of old days.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(worker) = env::args().nth(1) {
        return run_worker(&worker);
    }

    let exe = env::current_exe()?;
    let mut children = Vec::with_capacity(WORKERS);
    for n in 0..WORKERS {
        children.push(Command::new(&exe).arg(format!("worker-{n}")).spawn()?);
    }
    for mut child in children {
        child.wait()?;
    }
    println!("Done, see ./logs/shared.log.*");
    Ok(())
}

fn run_worker(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let sink = RotatingFileSinkBuilder::new("./logs", "shared.log")
        .retention_count(5)
        .build()?;

    for i in 1..=2_000 {
        sink.write(format!("[{name}] [pid {}] entry #{i}", std::process::id()));
        if i % 250 == 0 {
            thread::sleep(Duration::from_millis(200));
        }
    }
    // Anything still queued is written by the exit hook.
    Ok(())
}
