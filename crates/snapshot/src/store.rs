//! On-disk snapshot store
//!
//! # Layout
//!
//! ```text
//! {root}/
//! ├── blobs/<blake3>      # captured file contents, content-addressed
//! └── sets/<id>.json      # SnapshotSet manifests
//! ```
//!
//! Blobs and manifests are written to a new temporary file and renamed into
//! place. A set is immutable once its manifest exists.

use crate::error::{Error, Result};
use crate::types::{MANIFEST_VERSION, RestoreReport, Snapshot, SnapshotSet};
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const BLOBS_DIR: &str = "blobs";
const SETS_DIR: &str = "sets";

/// Length of the hex set ID
const ID_LEN: usize = 16;

static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

/// A directory of snapshot sets
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join(BLOBS_DIR).join(hash)
    }

    fn set_path(&self, id: &str) -> PathBuf {
        self.root.join(SETS_DIR).join(format!("{id}.json"))
    }

    /// Start collecting snapshots for one apply operation
    pub fn begin(&self, reason: impl Into<String>) -> Session<'_> {
        Session {
            store: self,
            reason: reason.into(),
            files: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Load a set manifest by ID
    pub fn load(&self, id: &str) -> Result<SnapshotSet> {
        let path = self.set_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(id.to_string()));
            }
            Err(e) => return Err(Error::io(&path)(e)),
        };

        let set: SnapshotSet = serde_json::from_str(&content)
            .map_err(|source| Error::Manifest { path, source })?;
        if set.version != MANIFEST_VERSION {
            return Err(Error::UnsupportedVersion(set.version));
        }
        Ok(set)
    }

    /// All sets, newest first
    pub fn list(&self) -> Result<Vec<SnapshotSet>> {
        let dir = self.root.join(SETS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&dir)(e)),
        };

        let mut sets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Error::io(&dir))?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(id) {
                Ok(set) => sets.push(set),
                Err(e) => log::warn!("Skipping unreadable snapshot {}: {}", path.display(), e),
            }
        }

        sets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(sets)
    }

    /// Put every file in the set back to its captured state.
    ///
    /// Files that did not exist at capture time are removed. Each blob is
    /// re-hashed before it is written back.
    pub fn restore(&self, id: &str) -> Result<RestoreReport> {
        let set = self.load(id)?;
        let mut report = RestoreReport::default();

        for snap in &set.files {
            if let Some(target) = &snap.link {
                relink(&snap.path, target).map_err(Error::io(&snap.path))?;
                report.restored.push(snap.path.clone());
                continue;
            }
            match &snap.blob {
                Some(hash) => {
                    let blob_path = self.blob_path(hash);
                    let bytes = fs::read(&blob_path).map_err(Error::io(&blob_path))?;
                    if blake3::hash(&bytes).to_hex().as_str() != hash.as_str() {
                        return Err(Error::Corrupt {
                            hash: hash.clone(),
                            path: snap.path.clone(),
                        });
                    }
                    write_atomic(&snap.path, &bytes).map_err(Error::io(&snap.path))?;
                    set_mode(&snap.path, snap.mode).map_err(Error::io(&snap.path))?;
                    report.restored.push(snap.path.clone());
                }
                None => match fs::remove_file(&snap.path) {
                    Ok(()) => report.removed.push(snap.path.clone()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::io(&snap.path)(e)),
                },
            }
        }

        log::info!(
            "Restored snapshot {} ({} restored, {} removed)",
            id,
            report.restored.len(),
            report.removed.len()
        );
        Ok(report)
    }

    /// Keep the newest `keep` sets, delete the rest and any orphaned blobs.
    ///
    /// Returns the number of sets removed.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let sets = self.list()?;
        let (kept, dropped) = sets.split_at(keep.min(sets.len()));

        for set in dropped {
            let path = self.set_path(&set.id);
            fs::remove_file(&path).map_err(Error::io(&path))?;
            log::debug!("Pruned snapshot {}", set.id);
        }

        let live: HashSet<&str> = kept
            .iter()
            .flat_map(|s| s.files.iter().filter_map(|f| f.blob.as_deref()))
            .collect();

        let blobs_dir = self.root.join(BLOBS_DIR);
        if let Ok(entries) = fs::read_dir(&blobs_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if !live.contains(name.as_str()) {
                    let path = entry.path();
                    fs::remove_file(&path).map_err(Error::io(&path))?;
                }
            }
        }

        Ok(dropped.len())
    }

    fn store_blob(&self, bytes: &[u8]) -> Result<String> {
        let hash = blake3::hash(bytes).to_hex().to_string();
        let path = self.blob_path(&hash);
        if !path.exists() {
            write_atomic(&path, bytes).map_err(Error::io(&path))?;
        }
        Ok(hash)
    }
}

/// Snapshots being collected for one apply; committed as a [`SnapshotSet`]
#[derive(Debug)]
pub struct Session<'a> {
    store: &'a SnapshotStore,
    reason: String,
    files: Vec<Snapshot>,
    seen: HashSet<PathBuf>,
}

impl Session<'_> {
    /// Capture the current state of `path`.
    ///
    /// Only the first capture of a path counts, so the set always holds the
    /// state from before this apply touched it.
    pub fn capture(&mut self, path: &Path) -> Result<()> {
        if self.seen.contains(path) {
            return Ok(());
        }

        let snap = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_file() => {
                let bytes = fs::read(path).map_err(Error::io(path))?;
                let hash = self.store.store_blob(&bytes)?;
                Snapshot {
                    path: path.to_path_buf(),
                    blob: Some(hash),
                    link: None,
                    mode: file_mode(&meta),
                    size: meta.len(),
                }
            }
            // The link itself, not what it points at
            Ok(meta) if meta.file_type().is_symlink() => Snapshot {
                path: path.to_path_buf(),
                blob: None,
                link: Some(fs::read_link(path).map_err(Error::io(path))?),
                mode: None,
                size: 0,
            },
            Ok(_) => return Err(Error::NotAFile(path.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Snapshot {
                path: path.to_path_buf(),
                blob: None,
                link: None,
                mode: None,
                size: 0,
            },
            Err(e) => return Err(Error::io(path)(e)),
        };

        log::debug!(
            "Captured {} ({})",
            path.display(),
            if snap.existed() { "existing" } else { "absent" }
        );
        self.seen.insert(path.to_path_buf());
        self.files.push(snap);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Write the manifest and return the immutable set
    pub fn commit(self) -> Result<SnapshotSet> {
        let created_at = Utc::now();

        let mut hasher = blake3::Hasher::new();
        hasher.update(created_at.to_rfc3339().as_bytes());
        hasher.update(self.reason.as_bytes());
        for snap in &self.files {
            hasher.update(snap.path.to_string_lossy().as_bytes());
            hasher.update(snap.blob.as_deref().unwrap_or("-").as_bytes());
            if let Some(link) = &snap.link {
                hasher.update(link.to_string_lossy().as_bytes());
            }
        }
        let id = hasher.finalize().to_hex()[..ID_LEN].to_string();

        let set = SnapshotSet {
            version: MANIFEST_VERSION,
            id,
            created_at,
            reason: self.reason,
            files: self.files,
        };

        let path = self.store.set_path(&set.id);
        let content = serde_json::to_vec_pretty(&set).map_err(|source| Error::Manifest {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &content).map_err(Error::io(&path))?;

        log::info!("Recorded snapshot {} ({} files)", set.id, set.files.len());
        Ok(set)
    }
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode())
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

/// Replace whatever is at `path` with a symlink to `target`
fn relink(path: &Path, target: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    symlink(target, path)
}

#[cfg(unix)]
fn symlink(target: &Path, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(windows)]
fn symlink(target: &Path, path: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, path)
}

#[cfg(not(any(unix, windows)))]
fn symlink(_target: &Path, path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot recreate symlink {}", path.display()),
    ))
}

/// Write `bytes` to a new sibling file, then rename it over `path`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = parent.join(format!(
        ".{}.tmp-{}-{}",
        name,
        std::process::id(),
        NEXT_TMP.fetch_add(1, Ordering::Relaxed)
    ));

    let result = (|| {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}
