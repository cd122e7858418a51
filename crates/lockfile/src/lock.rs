//! Lockfile model and persistence
//!
//! The lockfile (`preflight.lock`) records what is actually installed,
//! one entry per package key (`provider:name`), each stamped with the
//! machine that last wrote it and that machine's version vector.
//!
//! ```yaml
//! lock_version: 1
//! vector:
//!   laptop: 3
//! packages:
//!   brew:ripgrep:
//!     version: 14.1.0
//!     provenance:
//!       machine_id: laptop
//!       version_vector:
//!         laptop: 3
//! ```

use crate::error::{Error, Result};
use crate::vector::VersionVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Current lockfile format version
pub const LOCK_VERSION: u32 = 1;

/// Default lockfile name
pub const LOCK_FILENAME: &str = "preflight.lock";

/// Which machine wrote an entry, and what it had seen at the time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub machine_id: String,
    pub version_vector: VersionVector,
}

/// Resolved state of one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLockInfo {
    pub version: String,
    pub provenance: Provenance,
}

/// A change to record after an apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockChange {
    /// Package is installed at this version
    Upsert { key: String, version: String },
    /// Package was removed
    Remove { key: String },
}

/// A package whose resolved version differs from what the lockfile holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub key: String,
    pub locked: Option<String>,
    pub resolved: Option<String>,
}

/// The durable, shared record of resolved package versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub lock_version: u32,
    /// Lockfile-level vector: the merge of everything this file has seen
    #[serde(default)]
    pub vector: VersionVector,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageLockInfo>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockfile {
    /// Create an empty lockfile
    pub fn new() -> Self {
        Self {
            lock_version: LOCK_VERSION,
            vector: VersionVector::new(),
            packages: BTreeMap::new(),
        }
    }

    /// Load a lockfile, returning `None` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            // A file where a parent directory should be also means no lockfile
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                log::debug!("No lockfile at {}", path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(Error::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::from_yaml(&content, path).map(Some)
    }

    /// Load a lockfile, or an empty one when missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        Ok(Self::load(path)?.unwrap_or_default())
    }

    fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        let lock: Self = serde_yaml::from_str(content).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if lock.lock_version != LOCK_VERSION {
            return Err(Error::UnsupportedVersion {
                found: lock.lock_version,
                expected: LOCK_VERSION,
            });
        }

        Ok(lock)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(Error::Serialize)
    }

    /// Save the lockfile.
    ///
    /// Writes a fresh temporary file next to the target and renames it into
    /// place, so a crash never leaves a half-written lockfile behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_yaml()?;
        write_atomic(path, content.as_bytes()).map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Saved lockfile to {}", path.display());
        Ok(())
    }

    /// Look up a package entry
    pub fn get(&self, key: &str) -> Option<&PackageLockInfo> {
        self.packages.get(key)
    }

    /// Locked version for a package
    pub fn version_of(&self, key: &str) -> Option<&str> {
        self.packages.get(key).map(|info| info.version.as_str())
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Record the outcome of an apply made by `machine_id`.
    ///
    /// The machine's own counter advances once per call that actually changes
    /// something; every written entry is stamped with the new vector. Entries
    /// already at the recorded version keep their provenance. Returns the
    /// number of entries changed.
    pub fn record<I>(&mut self, machine_id: &str, changes: I) -> usize
    where
        I: IntoIterator<Item = LockChange>,
    {
        let effective: Vec<LockChange> = changes
            .into_iter()
            .filter(|change| match change {
                LockChange::Upsert { key, version } => self.version_of(key) != Some(version),
                LockChange::Remove { key } => self.packages.contains_key(key),
            })
            .collect();

        if effective.is_empty() {
            return 0;
        }

        self.vector.increment(machine_id);
        let provenance = Provenance {
            machine_id: machine_id.to_string(),
            version_vector: self.vector.clone(),
        };

        for change in &effective {
            match change {
                LockChange::Upsert { key, version } => {
                    log::debug!("Locking {key} at {version}");
                    self.packages.insert(
                        key.clone(),
                        PackageLockInfo {
                            version: version.clone(),
                            provenance: provenance.clone(),
                        },
                    );
                }
                LockChange::Remove { key } => {
                    log::debug!("Unlocking {key}");
                    self.packages.remove(key);
                }
            }
        }

        effective.len()
    }
}

impl Lockfile {
    /// Compare resolved versions against the lockfile.
    ///
    /// `resolved` yields `(key, version)` for each package that should be
    /// installed. A package drifts when its lock entry is missing or holds a
    /// different version. `None` versions drift only against a missing entry.
    pub fn verify_against<'a, I>(&self, resolved: I) -> Vec<Drift>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        resolved
            .into_iter()
            .filter_map(|(key, version)| {
                let locked = self.version_of(key);
                let drifted = match (locked, version) {
                    (None, _) => true,
                    (Some(l), Some(v)) => l != v,
                    (Some(_), None) => false,
                };
                drifted.then(|| Drift {
                    key: key.to_string(),
                    locked: locked.map(str::to_string),
                    resolved: version.map(str::to_string),
                })
            })
            .collect()
    }
}

/// Write `bytes` to `path` via a new sibling file and an atomic rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| LOCK_FILENAME.to_string());
    let temp_path = parent.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    let result = (|| {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn upsert(key: &str, version: &str) -> LockChange {
        LockChange::Upsert {
            key: key.to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_record_bumps_own_counter_once() {
        let mut lock = Lockfile::new();
        let changed = lock.record(
            "laptop",
            [upsert("brew:ripgrep", "14.0.0"), upsert("brew:fd", "9.0.0")],
        );

        assert_eq!(changed, 2);
        assert_eq!(lock.vector.get("laptop"), 1);
        let info = lock.get("brew:ripgrep").unwrap();
        assert_eq!(info.provenance.machine_id, "laptop");
        assert_eq!(info.provenance.version_vector.get("laptop"), 1);
    }

    #[test]
    fn test_record_without_changes_is_noop() {
        let mut lock = Lockfile::new();
        lock.record("laptop", [upsert("brew:ripgrep", "14.0.0")]);
        let before = lock.clone();

        let changed = lock.record("laptop", [upsert("brew:ripgrep", "14.0.0")]);
        assert_eq!(changed, 0);
        assert_eq!(lock, before);

        let changed = lock.record(
            "laptop",
            [LockChange::Remove {
                key: "brew:missing".to_string(),
            }],
        );
        assert_eq!(changed, 0);
    }

    #[test]
    fn test_record_remove() {
        let mut lock = Lockfile::new();
        lock.record("laptop", [upsert("brew:ripgrep", "14.0.0")]);
        lock.record(
            "laptop",
            [LockChange::Remove {
                key: "brew:ripgrep".to_string(),
            }],
        );
        assert!(lock.is_empty());
        assert_eq!(lock.vector.get("laptop"), 2);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILENAME);

        let mut lock = Lockfile::new();
        lock.record("laptop", [upsert("brew:ripgrep", "14.0.0")]);
        lock.record("desktop", [upsert("cargo:bat", "0.24.0")]);
        lock.save(&path).unwrap();

        let loaded = Lockfile::load(&path).unwrap().unwrap();
        assert_eq!(loaded, lock);

        // No temporary files left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        assert!(Lockfile::load(&dir.path().join("nope.lock")).unwrap().is_none());
    }

    #[test]
    fn test_load_under_regular_file_returns_none_and_save_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let path = blocker.join(LOCK_FILENAME);

        let mut lock = Lockfile::load_or_default(&path).unwrap();
        assert!(lock.is_empty());

        lock.record("laptop", [upsert("brew:ripgrep", "14.1.0")]);
        assert!(matches!(lock.save(&path), Err(Error::Write { .. })));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILENAME);
        fs::write(&path, "lock_version: 99\npackages: {}\n").unwrap();

        let err = Lockfile::load(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn test_verify_against_reports_drift() {
        let mut lock = Lockfile::new();
        lock.record(
            "laptop",
            [upsert("brew:ripgrep", "14.0.0"), upsert("brew:fd", "9.0.0")],
        );

        let drift = lock.verify_against([
            ("brew:ripgrep", Some("14.1.0")),
            ("brew:fd", Some("9.0.0")),
            ("brew:bat", None),
        ]);

        assert_eq!(
            drift,
            vec![
                Drift {
                    key: "brew:ripgrep".to_string(),
                    locked: Some("14.0.0".to_string()),
                    resolved: Some("14.1.0".to_string()),
                },
                Drift {
                    key: "brew:bat".to_string(),
                    locked: None,
                    resolved: None,
                },
            ]
        );
        assert!(lock.verify_against([("brew:fd", None)]).is_empty());
    }

    #[test]
    fn test_parses_documented_format() {
        let yaml = r"
lock_version: 1
vector:
  laptop: 3
packages:
  brew:ripgrep:
    version: 14.1.0
    provenance:
      machine_id: laptop
      version_vector:
        laptop: 3
";
        let lock = Lockfile::from_yaml(yaml, Path::new("inline")).unwrap();
        assert_eq!(lock.version_of("brew:ripgrep"), Some("14.1.0"));
        assert_eq!(lock.vector.get("laptop"), 3);
    }
}
