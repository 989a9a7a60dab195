//! Error kinds surfaced to the host.
//!
//! Interactive operations return exactly one [`DcError`] with enough context (path + cause)
//! to message the user. The watcher never returns these; it logs and keeps polling.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DcError>;

#[derive(Error, Debug)]
pub enum DcError {
    /// A file is missing, or no storage directory has been selected.
    #[error("not found: {0}")]
    NotFound(String),

    /// Reading kept failing after the retry budget (the game holds the file).
    #[error("{path:?} is locked (gave up after {attempts} attempts): {source}")]
    Locked {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// The payload is not valid percent-encoded UTF-8.
    #[error("malformed encoding at byte {offset}: {reason}")]
    MalformedEncoding { offset: usize, reason: &'static str },

    /// The decoded text is not JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// The JSON root is something other than an object.
    #[error("expected a JSON object at the root, found {found}")]
    NotADocument { found: &'static str },

    /// Editor text was rejected.
    #[error("invalid document at line {line}, column {column}: {message}")]
    InvalidDocument {
        line: usize,
        column: usize,
        message: String,
    },

    /// Write, rename or delete failed.
    #[error("could not persist {path:?}: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating, reading or extracting a backup archive failed.
    #[error("archive {path:?} failed: {message}")]
    ArchiveFailed { path: PathBuf, message: String },

    /// The config file exists but is not valid TOML for [`crate::config::Config`].
    #[error("invalid config {path:?}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    /// Name or id collision.
    #[error("conflict: {0}")]
    Conflict(String),

    /// User-supplied bytes are not a decodable image.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("cancelled")]
    Cancelled,
}

impl DcError {
    pub fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DcError::PersistFailed {
            path: path.into(),
            source,
        }
    }

    pub fn archive(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        DcError::ArchiveFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
