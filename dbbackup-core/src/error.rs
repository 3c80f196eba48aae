/*!
Error types for the dbbackup core.
*/

use thiserror::Error;

/// Result type used throughout the dbbackup core.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Errors that can occur during backup and restore operations.
#[derive(Error, Debug)]
pub enum BackupError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection string names a database family we cannot back up
    #[error("unsupported database backend: {0}")]
    UnsupportedBackend(String),

    /// The dump utility exited non-zero or could not be started
    #[error("dump failed: {0}")]
    Dump(String),

    /// The restore utility exited non-zero or could not be started
    #[error("restore failed: {0}")]
    Restore(String),

    /// Compression/decompression errors
    #[error("compression error: {0}")]
    Compression(String),

    /// Storage backend errors, with the offending path or key attached
    #[error("storage error: {0}")]
    Storage(String),

    /// Missing or malformed configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl BackupError {
    /// Create a new dump error
    pub fn dump<S: Into<String>>(msg: S) -> Self {
        Self::Dump(msg.into())
    }

    /// Create a new restore error
    pub fn restore<S: Into<String>>(msg: S) -> Self {
        Self::Restore(msg.into())
    }

    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
