//! # Snapshot
//!
//! Point-in-time copies of files, taken before an apply overwrites or
//! deletes them, so the apply can be rolled back.
//!
//! A [`Session`] collects one [`Snapshot`] per touched path; committing it
//! writes an immutable [`SnapshotSet`] whose ID is derived from its content.
//! File contents are stored once per BLAKE3 hash and verified on restore.
//!
//! ## Example
//!
//! ```no_run
//! use snapshot::SnapshotStore;
//! use std::path::Path;
//!
//! let store = SnapshotStore::new("/tmp/preflight/snapshots");
//! let mut session = store.begin("preflight apply");
//! session.capture(Path::new("/home/me/.gitconfig"))?;
//! let set = session.commit()?;
//!
//! // ... later, undo the apply
//! store.restore(&set.id)?;
//! # Ok::<(), snapshot::Error>(())
//! ```

mod error;
mod store;
mod types;

pub use error::{Error, Result};
pub use store::{Session, SnapshotStore, write_atomic};
pub use types::{MANIFEST_VERSION, RestoreReport, Snapshot, SnapshotSet};
