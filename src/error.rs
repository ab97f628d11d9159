//! Centralized error types for mboxextract.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxextract library.
#[derive(Error, Debug)]
pub enum MboxError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file does not appear to be a valid MBOX.
    #[error("File does not appear to be a valid MBOX: {0}")]
    InvalidMbox(PathBuf),

    /// The character encoding is not supported.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    MimeError(String),

    /// The user interrupted the run.
    #[error("Interrupted by user")]
    Interrupted,

    /// The run configuration was rejected before processing started.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Message context required to name an attachment is missing.
    #[error("Missing message context: {0}")]
    MissingContext(String),

    /// The attachment was already written to disk.
    #[error("Attachment already saved to '{0}'")]
    AlreadySaved(PathBuf),

    /// No free file name could be found next to the given path.
    #[error("No unused file name available for '{0}'")]
    NameExhausted(PathBuf),
}

/// Convenience alias for `Result<T, MboxError>`.
pub type Result<T> = std::result::Result<T, MboxError>;

impl MboxError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `MboxError::io`).
impl From<std::io::Error> for MboxError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
