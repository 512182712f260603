use {
    rollsink::{FlushGuard, RotatingFileSinkBuilder, TimeZone},
    tracing_subscriber::util::SubscriberInitExt,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _flush = FlushGuard::new();
    let sink = RotatingFileSinkBuilder::new("./logs", "tracing.log")
        .retention_count(3)
        .time_zone(TimeZone::Local)
        .build()?;
    tracing_subscriber::fmt()
        .with_writer(sink)
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .finish()
        .try_init()?;

    tracing::info!("This is an info message");
    tracing::warn!("This is a warning message");
    tracing::error!("This is an error message");

    Ok(())
}
