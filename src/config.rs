//! Settings file (`config.toml`)
//!
//! ```toml
//! machine_id = "laptop"
//! mode = "locked"
//! layers = ["~/dotfiles/preflight/base.yaml", "~/dotfiles/preflight/work.yaml"]
//! rollback_on_failure = true
//!
//! [providers.brew]
//! install = "brew install {spec}"
//! remove = "brew uninstall {name}"
//! query = "brew list --versions {name} | awk '{print $2}'"
//! latest = "brew info --json=v2 {name} | jq -r '.formulae[0].versions.stable'"
//!
//! [providers.git]
//! get = "git config --global --get {key}"
//! set = "git config --global {key} {value}"
//! unset = "git config --global --unset {key}"
//! ```

use anyhow::{Context, Result};
use declarative::ReproducibilityMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

pub const CONFIG_FILENAME: &str = "config.toml";

/// Shell command templates for one provider
///
/// Placeholders: `{name}`, `{version}`, `{spec}` (`name@version`, or `name`
/// when unpinned), `{key}`, `{value}`. Every substitution is shell-quoted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCommands {
    pub install: Option<String>,
    pub remove: Option<String>,
    /// Exit status 0 when installed; stdout is the installed version
    pub query: Option<String>,
    /// Prints the newest available version
    pub latest: Option<String>,
    /// Exit status 0 when set; stdout is the current value
    pub get: Option<String>,
    pub set: Option<String>,
    pub unset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Identity used in lockfile version vectors
    pub machine_id: Option<String>,
    pub mode: ReproducibilityMode,
    /// Desired-state layers, merged in order
    pub layers: Vec<String>,
    pub lockfile: Option<String>,
    pub snapshot_dir: Option<String>,
    pub rollback_on_failure: bool,
    pub providers: BTreeMap<String, ProviderCommands>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            machine_id: None,
            mode: ReproducibilityMode::Intent,
            layers: Vec::new(),
            lockfile: None,
            snapshot_dir: None,
            rollback_on_failure: true,
            providers: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load from `path`, or from the config directory when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(paths::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Layer files with `~` and variables expanded
    pub fn layer_paths(&self) -> Vec<PathBuf> {
        self.layers.iter().map(|l| paths::expand(l)).collect()
    }

    pub fn lockfile_path(&self) -> Result<PathBuf> {
        match &self.lockfile {
            Some(p) => Ok(paths::expand(p)),
            None => Ok(paths::config_dir()?.join(lockfile::LOCK_FILENAME)),
        }
    }

    pub fn snapshot_path(&self) -> Result<PathBuf> {
        match &self.snapshot_dir {
            Some(p) => Ok(paths::expand(p)),
            None => paths::snapshot_dir(),
        }
    }

    /// Configured machine id, else the host name
    pub fn machine_id(&self) -> String {
        if let Some(id) = self.machine_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        if let Ok(host) = std::env::var("HOSTNAME")
            && !host.is_empty()
        {
            return host;
        }
        crate::runner::run_capture("hostname", &[])
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string())
    }
}
