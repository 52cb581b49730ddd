//! Centralized error types for dbxtract.

use std::path::PathBuf;
use thiserror::Error;

use crate::container::format::ContainerKind;

/// All errors produced by the dbxtract library.
#[derive(Error, Debug)]
pub enum DbxError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("DBX file not found: {0}")]
    FileNotFound(PathBuf),

    /// The container holds no messages (folder list, legacy or unknown format).
    #[error("{path} does not contain messages ({kind})")]
    UnsupportedContainer { path: PathBuf, kind: ContainerKind },

    /// A read extended past the end of the byte source.
    #[error("read of {len} byte(s) at offset {offset:#x} is out of bounds")]
    OutOfBounds { offset: u64, len: usize },

    /// An index table could not be trusted.
    #[error("corrupt index table at offset {offset:#x}: {reason}")]
    CorruptIndex { offset: u64, reason: String },

    /// A storage block in a message chain could not be trusted.
    #[error("corrupt storage block at offset {offset:#x}: {reason}")]
    CorruptBlock { offset: u64, reason: String },
}

/// Convenience alias for `Result<T, DbxError>`.
pub type Result<T> = std::result::Result<T, DbxError>;

impl DbxError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare; prefer `DbxError::io`).
impl From<std::io::Error> for DbxError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

/// A best-effort result: whatever could be decoded, plus the corruption
/// that stopped decoding early, if any.
#[derive(Debug)]
pub struct Partial<T> {
    pub value: T,
    pub error: Option<DbxError>,
}

impl<T> Partial<T> {
    /// A complete, undamaged result.
    pub fn complete(value: T) -> Self {
        Self { value, error: None }
    }

    /// A result cut short by `error`.
    pub fn truncated(value: T, error: DbxError) -> Self {
        Self {
            value,
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Discard the diagnostic and keep the value.
    pub fn into_value(self) -> T {
        self.value
    }
}
