use std::path::PathBuf;

/// Errors that can occur when building or flushing a rotating sink.
#[derive(Debug, thiserror::Error)]
pub enum RollSinkError {
    #[error("Failed to create directory '{0}': {1}")]
    CreateDirectoryFailed(PathBuf, String),
    #[error("Failed to create file '{0}': {1}")]
    CreateFileFailed(PathBuf, String),
    #[error("Failed to append to '{0}': {1}")]
    WriteFailed(PathBuf, String),
    #[error("Failed to lock '{0}': {1}")]
    LockFailed(PathBuf, String),
    #[error("Failed to list directory '{0}': {1}")]
    ListDirectoryFailed(PathBuf, String),
    #[error("Failed to set file permissions for '{path}': {error}")]
    SetFilePermissionsError { path: PathBuf, error: String },
    #[error("Failed to install signal flush: {0}")]
    SignalSetupFailed(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File IO error: {0}")]
    FileIOError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(String),
}
