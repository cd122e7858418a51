//! Error types for the reconciliation engine

use thiserror::Error;

/// Errors that stop a compile, plan or apply
#[derive(Error, Debug)]
pub enum Error {
    /// A layer references a provider nobody registered
    #[error("unknown provider '{provider}' at {location}")]
    UnknownProvider { provider: String, location: String },

    /// A resource declaration does not have the expected shape
    #[error("malformed resource at {location}: {message}")]
    MalformedResource { location: String, message: String },

    /// Frozen mode: resolution would move away from the lockfile
    #[error(
        "frozen: {package} resolves to {} but the lockfile has {}",
        .resolved.as_deref().unwrap_or("nothing"),
        .locked.as_deref().unwrap_or("nothing")
    )]
    FrozenMismatch {
        package: String,
        locked: Option<String>,
        resolved: Option<String>,
    },

    /// Version resolution failed
    #[error("failed to resolve {package}: {source}")]
    Resolve {
        package: String,
        #[source]
        source: anyhow::Error,
    },

    /// Observed state could not be collected
    #[error("failed to observe {step}: {source}")]
    Observe {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    /// Snapshot store failure
    #[error(transparent)]
    Snapshot(#[from] snapshot::Error),

    /// Lockfile failure
    #[error(transparent)]
    Lockfile(#[from] lockfile::Error),

    /// Some steps failed while others were applied
    #[error("{failed} of {total} steps failed")]
    StepsFailed { failed: usize, total: usize },

    /// A step failed and the apply was rolled back
    #[error("step {step} failed, rolled back snapshot {snapshot}: {cause}")]
    RolledBack {
        step: String,
        snapshot: String,
        cause: String,
    },

    /// Restoring the snapshot after a failure did not succeed either
    #[error("step {step} failed ({cause}) and rollback failed: {source}")]
    RollbackFailed {
        step: String,
        cause: String,
        #[source]
        source: snapshot::Error,
    },

    /// Apply stopped early on request
    #[error("apply cancelled after {completed} of {total} steps")]
    Cancelled { completed: usize, total: usize },
}

impl Error {
    /// Whether the error happened before anything was changed
    pub fn is_pre_apply(&self) -> bool {
        matches!(
            self,
            Self::UnknownProvider { .. }
                | Self::MalformedResource { .. }
                | Self::FrozenMismatch { .. }
                | Self::Resolve { .. }
                | Self::Observe { .. }
        )
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
