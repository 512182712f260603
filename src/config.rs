//! Declarative sink configuration, for hosts that read their logging setup
//! from a config file rather than calling the builder directly.

use {
    crate::{
        sink::{DEFAULT_FLUSH_PERIOD, DEFAULT_RETENTION_COUNT},
        RollSinkError, RotatingFileSink, RotatingFileSinkBuilder, TimeZone,
    },
    chrono::FixedOffset,
    serde::Deserialize,
    std::{path::PathBuf, time::Duration},
};

/// Time zone as written in configuration: `"utc"`, `"local"`, or
/// `{ offset = <seconds east of UTC> }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZoneConfig {
    Utc,
    #[default]
    Local,
    Offset(i32),
}

impl TimeZoneConfig {
    fn resolve(self) -> Result<TimeZone, RollSinkError> {
        match self {
            TimeZoneConfig::Utc => Ok(TimeZone::UTC),
            TimeZoneConfig::Local => Ok(TimeZone::Local),
            TimeZoneConfig::Offset(seconds) => FixedOffset::east_opt(seconds)
                .map(TimeZone::Fix)
                .ok_or_else(|| RollSinkError::InvalidConfig(format!("time zone offset {seconds}s is out of range"))),
        }
    }
}

/// Settings for one rotating sink.
///
/// ```
/// let config: rollsink::SinkConfig = toml::from_str(r#"
///     directory = "/var/log/myapp"
///     base_filename = "myapp.log"
///     retention_count = 14
/// "#).unwrap();
/// assert_eq!(config.flush_period_seconds, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    pub directory: PathBuf,
    pub base_filename: String,
    #[serde(default = "default_retention_count")]
    pub retention_count: usize,
    #[serde(default = "default_flush_period_seconds")]
    pub flush_period_seconds: u64,
    #[serde(default)]
    pub time_zone: TimeZoneConfig,
    #[serde(default)]
    pub file_mode: Option<u32>,
}

fn default_retention_count() -> usize {
    DEFAULT_RETENTION_COUNT
}

fn default_flush_period_seconds() -> u64 {
    DEFAULT_FLUSH_PERIOD.as_secs()
}

impl SinkConfig {
    /// A builder preloaded with these settings.
    pub fn builder(&self) -> Result<RotatingFileSinkBuilder, RollSinkError> {
        let mut builder = RotatingFileSinkBuilder::new(&self.directory, &self.base_filename)
            .retention_count(self.retention_count)
            .flush_period(Duration::from_secs(self.flush_period_seconds))
            .time_zone(self.time_zone.resolve()?);
        if let Some(mode) = self.file_mode {
            builder = builder.file_mode(mode);
        }
        Ok(builder)
    }

    pub fn build(&self) -> Result<RotatingFileSink, RollSinkError> {
        self.builder()?.build()
    }
}
