use super::{Ensure, Phase, Step};
use crate::context::{ApplyContext, StateCollector};
use crate::document::Document;
use crate::types::ApplyResult;
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Built-in provider that manages files directly
pub const FILES_PROVIDER: &str = "files";

/// Write or delete one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStep {
    pub path: PathBuf,
    pub content: String,
    pub ensure: Ensure,
}

impl FileStep {
    pub fn write(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            ensure: Ensure::Present,
        }
    }

    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            ensure: Ensure::Absent,
        }
    }

    /// The file a write lands in. Writes go through symlinks so a linked
    /// dotfile keeps its link; deletes remove the link itself.
    fn target(&self) -> PathBuf {
        match self.ensure {
            Ensure::Present => resolve_links(&self.path),
            Ensure::Absent => self.path.clone(),
        }
    }
}

/// Follow a chain of symlinks, dangling ones included
fn resolve_links(path: &Path) -> PathBuf {
    if let Ok(real) = fs::canonicalize(path) {
        return real;
    }
    let mut current = path.to_path_buf();
    // Bounded, a cycle just stops at whatever link we reached
    for _ in 0..40 {
        let Ok(next) = fs::read_link(&current) else {
            break;
        };
        current = match current.parent() {
            Some(parent) if next.is_relative() => parent.join(next),
            _ => next,
        };
    }
    current
}

impl Step for FileStep {
    fn id(&self) -> String {
        let action = match self.ensure {
            Ensure::Present => "write",
            Ensure::Absent => "delete",
        };
        format!("{}:{}:{}", FILES_PROVIDER, action, self.path.display())
    }

    fn provider(&self) -> &str {
        FILES_PROVIDER
    }

    fn resource(&self) -> String {
        self.path.display().to_string()
    }

    fn phase(&self) -> Phase {
        Phase::Configure
    }

    fn description(&self) -> String {
        match self.ensure {
            Ensure::Present => format!("Write {}", self.path.display()),
            Ensure::Absent => format!("Delete {}", self.path.display()),
        }
    }

    fn desired(&self) -> Option<Document> {
        match self.ensure {
            Ensure::Present => Some(Document::from_pairs([(
                "content",
                Document::from(self.content.as_str()),
            )])),
            Ensure::Absent => None,
        }
    }

    fn observe(&self, _collector: &dyn StateCollector) -> Result<Option<Document>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(Document::from_pairs([(
                "content",
                Document::from(String::from_utf8_lossy(&bytes).into_owned()),
            )]))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    fn touches(&self) -> Vec<PathBuf> {
        vec![self.target()]
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        match self.ensure {
            Ensure::Present => {
                let target = self.target();
                let existed = target.exists();
                snapshot::write_atomic(&target, self.content.as_bytes())
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                log::debug!("Wrote {}", target.display());
                Ok(if existed {
                    ApplyResult::Modified
                } else {
                    ApplyResult::Created
                })
            }
            Ensure::Absent => match fs::remove_file(&self.path) {
                Ok(()) => Ok(ApplyResult::Removed),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ApplyResult::NoChange),
                Err(e) => {
                    Err(e).with_context(|| format!("Failed to delete {}", self.path.display()))
                }
            },
        }
    }
}
