//! Error types for the snapshot crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while capturing or restoring snapshots
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be parsed or written
    #[error("invalid snapshot manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No snapshot set with this ID
    #[error("snapshot not found: {0}")]
    NotFound(String),

    /// Only regular files can be captured
    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// A stored blob no longer matches its content hash
    #[error("snapshot blob {hash} is corrupt (restoring {})", .path.display())]
    Corrupt { hash: String, path: PathBuf },

    /// Manifest format version is not supported
    #[error("unsupported snapshot manifest version {0}")]
    UnsupportedVersion(u32),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, Error>;
