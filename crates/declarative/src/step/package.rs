use super::{Phase, Step};
use crate::context::{ApplyContext, ResourceKind, StateCollector};
use crate::document::Document;
use crate::types::ApplyResult;
use anyhow::Result;
use lockfile::LockChange;
use std::fmt;
use std::str::FromStr;

/// Whether a resource should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl FromStr for Ensure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" | "installed" | "latest" => Ok(Self::Present),
            "absent" | "removed" => Ok(Self::Absent),
            other => Err(format!("unknown ensure value '{other}'")),
        }
    }
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Present => "present",
            Self::Absent => "absent",
        })
    }
}

/// Install or remove one package through its provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageStep {
    pub provider: String,
    pub name: String,
    /// Resolved version; `None` accepts whatever is installed
    pub version: Option<String>,
    pub ensure: Ensure,
}

impl PackageStep {
    pub fn present(provider: &str, name: &str, version: Option<String>) -> Self {
        Self {
            provider: provider.to_string(),
            name: name.to_string(),
            version,
            ensure: Ensure::Present,
        }
    }

    pub fn absent(provider: &str, name: &str) -> Self {
        Self {
            provider: provider.to_string(),
            name: name.to_string(),
            version: None,
            ensure: Ensure::Absent,
        }
    }

    /// Key of this package in the lockfile
    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.provider, self.name)
    }

    fn observed_raw(&self, collector: &dyn StateCollector) -> Result<Option<Document>> {
        let observed = collector.observe(&self.provider, ResourceKind::Package, &self.name)?;
        Ok(observed.map(|doc| match doc {
            Document::Mapping(_) => doc,
            d if d.is_null() => Document::mapping(),
            scalar => Document::from_pairs([("version", scalar)]),
        }))
    }
}

impl Step for PackageStep {
    fn id(&self) -> String {
        let action = match self.ensure {
            Ensure::Present => "install",
            Ensure::Absent => "remove",
        };
        format!("{}:{}:{}", self.provider, action, self.name)
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn resource(&self) -> String {
        self.name.clone()
    }

    fn phase(&self) -> Phase {
        Phase::Install
    }

    fn description(&self) -> String {
        match (self.ensure, &self.version) {
            (Ensure::Present, Some(v)) => format!("Install {} {}@{}", self.provider, self.name, v),
            (Ensure::Present, None) => format!("Install {} {}", self.provider, self.name),
            (Ensure::Absent, _) => format!("Remove {} {}", self.provider, self.name),
        }
    }

    fn desired(&self) -> Option<Document> {
        match self.ensure {
            Ensure::Absent => None,
            Ensure::Present => Some(match &self.version {
                Some(v) => Document::from_pairs([("version", Document::from(v.as_str()))]),
                None => Document::mapping(),
            }),
        }
    }

    fn observe(&self, collector: &dyn StateCollector) -> Result<Option<Document>> {
        let observed = self.observed_raw(collector)?;
        if self.version.is_some() {
            return Ok(observed);
        }
        // Unpinned: any installed version satisfies
        Ok(observed.map(|doc| match doc {
            Document::Mapping(mut fields) => {
                fields.shift_remove("version");
                Document::Mapping(fields)
            }
            other => other,
        }))
    }

    fn lock_change(&self, collector: &dyn StateCollector) -> Result<Option<LockChange>> {
        let key = self.lock_key();
        if self.ensure == Ensure::Absent {
            return Ok(Some(LockChange::Remove { key }));
        }

        // Only what the provider reports as installed gets locked
        let version = self
            .observed_raw(collector)?
            .and_then(|doc| doc.get("version").and_then(Document::scalar_text));

        Ok(version.map(|version| LockChange::Upsert { key, version }))
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        match self.ensure {
            Ensure::Present => {
                ctx.backend
                    .install(&self.provider, &self.name, self.version.as_deref())?;
                Ok(ApplyResult::Created)
            }
            Ensure::Absent => {
                ctx.backend.remove(&self.provider, &self.name)?;
                Ok(ApplyResult::Removed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemorySystem;

    #[test]
    fn test_ids_and_descriptions() {
        let install = PackageStep::present("brew", "ripgrep", Some("14.1.0".into()));
        assert_eq!(install.id(), "brew:install:ripgrep");
        assert_eq!(install.description(), "Install brew ripgrep@14.1.0");
        assert_eq!(install.lock_key(), "brew:ripgrep");

        let remove = PackageStep::absent("brew", "wget");
        assert_eq!(remove.id(), "brew:remove:wget");
        assert!(remove.desired().is_none());
    }

    #[test]
    fn test_unpinned_observe_ignores_version() {
        let system = MemorySystem::new().with_package("brew", "ripgrep", "13.0.0");
        let step = PackageStep::present("brew", "ripgrep", None);

        assert_eq!(step.observe(&system).unwrap(), step.desired());
    }

    #[test]
    fn test_pinned_observe_keeps_version() {
        let system = MemorySystem::new().with_package("brew", "ripgrep", "13.0.0");
        let step = PackageStep::present("brew", "ripgrep", Some("14.1.0".into()));

        let observed = step.observe(&system).unwrap().unwrap();
        assert_eq!(observed.get("version"), Some(&Document::from("13.0.0")));
    }

    #[test]
    fn test_lock_change_uses_installed_version_when_unpinned() {
        let system = MemorySystem::new().with_package("cargo", "bat", "0.24.0");
        let step = PackageStep::present("cargo", "bat", None);

        assert_eq!(
            step.lock_change(&system).unwrap(),
            Some(LockChange::Upsert {
                key: "cargo:bat".into(),
                version: "0.24.0".into(),
            })
        );
        assert_eq!(
            PackageStep::absent("cargo", "bat").lock_change(&system).unwrap(),
            Some(LockChange::Remove {
                key: "cargo:bat".into()
            })
        );
    }

    #[test]
    fn test_lock_change_records_observed_version_not_pin() {
        let step = PackageStep::present("brew", "ripgrep", Some("14.1.0".into()));
        assert_eq!(step.lock_change(&MemorySystem::new()).unwrap(), None);

        let system = MemorySystem::new().with_package("brew", "ripgrep", "14.0.0");
        assert_eq!(
            step.lock_change(&system).unwrap(),
            Some(LockChange::Upsert {
                key: "brew:ripgrep".into(),
                version: "14.0.0".into(),
            })
        );
    }

    #[test]
    fn test_ensure_parse() {
        assert_eq!("absent".parse::<Ensure>().unwrap(), Ensure::Absent);
        assert_eq!("installed".parse::<Ensure>().unwrap(), Ensure::Present);
        assert!("maybe".parse::<Ensure>().is_err());
    }
}
