use {
    rollsink::{FlushGuard, RotatingFileSinkBuilder, TimeZone},
    std::io::Write,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _flush = FlushGuard::new();
    let mut logger = RotatingFileSinkBuilder::new("./logs", "daily.log")
        .time_zone(TimeZone::UTC) // Day boundaries at UTC midnight on every host
        .retention_count(7) // Keep one week of logs
        .build()?;

    // Queued in memory, written out by the flush thread or at exit
    logger.write("System startup - UTC date will be used for rotation");
    writeln!(logger, "Configuration loaded successfully")?;
    writeln!(logger, "Server listening on port 8080")?;

    println!("Logging to {}", logger.current_path().display());
    Ok(())
}
