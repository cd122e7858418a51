//! # Lockfile
//!
//! The shared record of what is actually installed on each machine, and
//! the engine that keeps several machines' lockfiles consistent.
//!
//! - [`Lockfile`] maps package keys (`provider:name`) to a resolved version
//!   plus [`Provenance`]: the machine that wrote the entry and its
//!   [`VersionVector`] at that time.
//! - [`classify`] compares two vectors and yields a [`CausalRelation`].
//! - [`sync()`] compares a local and a remote lockfile package by package
//!   and reports [`LockConflict`]s for entries both sides changed.
//!
//! ## Example
//!
//! ```no_run
//! use lockfile::{LockChange, Lockfile, sync};
//! use std::path::Path;
//!
//! let mut local = Lockfile::load_or_default(Path::new("preflight.lock"))?;
//! local.record("laptop", [LockChange::Upsert {
//!     key: "brew:ripgrep".into(),
//!     version: "14.1.0".into(),
//! }]);
//!
//! let remote = Lockfile::load_or_default(Path::new("remote/preflight.lock"))?;
//! let result = sync(&local, &remote, None);
//! if !result.has_manual_conflicts() {
//!     result.merge()?.save(Path::new("preflight.lock"))?;
//! }
//! # Ok::<(), lockfile::Error>(())
//! ```

mod error;
mod lock;
mod sync;
mod vector;

pub use error::{Error, Result};
pub use lock::{
    Drift, LOCK_FILENAME, LOCK_VERSION, LockChange, Lockfile, PackageLockInfo, Provenance,
};
pub use sync::{
    ConflictKind, ConflictRow, Decision, LockConflict, Resolution, SyncOutcome, SyncResult,
    SyncSummary, sync,
};
pub use vector::{CausalRelation, VersionVector, classify};
