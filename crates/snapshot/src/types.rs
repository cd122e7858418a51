//! Snapshot data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Prior state of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub path: PathBuf,
    /// Content hash of the captured bytes; `None` when the file did not exist
    pub blob: Option<String>,
    /// Target of a captured symlink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(default)]
    pub size: u64,
}

impl Snapshot {
    /// Whether the file existed when it was captured
    pub fn existed(&self) -> bool {
        self.blob.is_some() || self.link.is_some()
    }
}

/// All snapshots taken for one apply operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSet {
    pub version: u32,
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub reason: String,
    pub files: Vec<Snapshot>,
}

impl SnapshotSet {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// What a restore did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Files written back from their blobs, and relinked symlinks
    pub restored: Vec<PathBuf>,
    /// Files removed because they did not exist before
    pub removed: Vec<PathBuf>,
}

impl RestoreReport {
    /// Every path the restore touched
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.restored.iter().chain(self.removed.iter())
    }
}
