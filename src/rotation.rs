//! Rotation keys: how the current file name is derived from the clock, and
//! how rotated files are recognised again when it is time to prune them.

use {
    crate::RollSinkError,
    chrono::{DateTime, FixedOffset, Local, Utc},
    regex::Regex,
};

/// `strftime` pattern of the rotation key. Fixed width and zero padded, so
/// sorting rotated file names as strings sorts them by age.
pub const ROTATION_KEY_FORMAT: &str = "%Y-%m-%d";

/// Specifies the time zone used to decide which day a flush belongs to.
///
/// # Examples
/// ```
/// use rollsink::TimeZone;
/// use chrono::FixedOffset;
///
/// // Same file boundaries on every host
/// let utc = TimeZone::UTC;
///
/// // Boundaries follow the system clock settings, including DST changes
/// let local = TimeZone::Local;
///
/// // A specific region regardless of where the process runs (UTC+8)
/// let shanghai = TimeZone::Fix(FixedOffset::east_opt(8 * 3600).unwrap());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeZone {
    /// Coordinated universal time.
    UTC,
    /// The system's local time zone, re-read on every flush.
    #[default]
    Local,
    /// A fixed offset from UTC.
    Fix(FixedOffset),
}

impl TimeZone {
    /// The rotation key for the current wall-clock time.
    pub fn rotation_key(&self) -> String {
        self.rotation_key_at(Utc::now())
    }

    /// The rotation key for `instant` in this time zone.
    pub fn rotation_key_at(&self, instant: DateTime<Utc>) -> String {
        match self {
            TimeZone::UTC => instant.format(ROTATION_KEY_FORMAT).to_string(),
            TimeZone::Local => instant.with_timezone(&Local).format(ROTATION_KEY_FORMAT).to_string(),
            TimeZone::Fix(offset) => instant.with_timezone(offset).format(ROTATION_KEY_FORMAT).to_string(),
        }
    }
}

/// `{base_filename}.{rotation_key}`
pub fn rotation_file_name(base_filename: &str, rotation_key: &str) -> String {
    format!("{base_filename}.{rotation_key}")
}

/// Recognises the rotated files that belong to one base filename.
///
/// A name matches only when it is exactly the base filename, a dot, a date
/// key, and at most one trailing `.extension`. Anything else in the directory
/// is left alone, even if it shares the prefix.
#[derive(Debug, Clone)]
pub struct RotationPattern {
    regex: Regex,
}

impl RotationPattern {
    pub fn new(base_filename: &str) -> Result<Self, RollSinkError> {
        let pattern = format!(
            r"^{}\.[0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}}(\.[A-Za-z0-9_]+)?$",
            regex::escape(base_filename)
        );
        let regex = Regex::new(&pattern).map_err(|err| RollSinkError::InternalError(err.to_string()))?;
        Ok(RotationPattern { regex })
    }

    pub fn is_match(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }
}
