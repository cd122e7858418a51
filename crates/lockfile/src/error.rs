//! Error types for the lockfile crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading, writing or merging lockfiles
#[derive(Error, Debug)]
pub enum Error {
    /// Lockfile could not be read
    #[error("failed to read lockfile {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Lockfile could not be written
    #[error("failed to write lockfile {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Lockfile YAML is malformed
    #[error("failed to parse lockfile {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Lockfile could not be serialized
    #[error("failed to serialize lockfile: {0}")]
    Serialize(#[source] serde_yaml::Error),

    /// Lockfile format version is not supported
    #[error("unsupported lockfile version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// A merge was attempted while manual conflicts are outstanding
    #[error("{0} conflict(s) need manual resolution before the lockfiles can be merged")]
    ManualConflicts(usize),

    /// A resolution was supplied for a package that is not in conflict
    #[error("no conflict recorded for package: {0}")]
    UnknownConflict(String),
}

/// Result type for lockfile operations
pub type Result<T> = std::result::Result<T, Error>;
