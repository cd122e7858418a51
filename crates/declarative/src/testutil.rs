//! In-memory system used by the engine's tests

use crate::context::{Backend, ResourceKind, Resolver, StateCollector};
use crate::document::Document;
use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

type Key = (String, String);

fn key(provider: &str, name: &str) -> Key {
    (provider.to_string(), name.to_string())
}

/// Fake machine: installed packages, config keys and upstream versions
#[derive(Debug, Default)]
pub struct MemorySystem {
    packages: Mutex<BTreeMap<Key, String>>,
    config: Mutex<BTreeMap<Key, Document>>,
    latest: BTreeMap<Key, String>,
    failing: BTreeSet<String>,
    pub installs: Mutex<Vec<String>>,
}

impl MemorySystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(self, provider: &str, name: &str, version: &str) -> Self {
        self.packages
            .lock()
            .unwrap()
            .insert(key(provider, name), version.to_string());
        self
    }

    pub fn with_config(self, provider: &str, name: &str, value: Document) -> Self {
        self.config.lock().unwrap().insert(key(provider, name), value);
        self
    }

    pub fn with_latest(mut self, provider: &str, name: &str, version: &str) -> Self {
        self.latest.insert(key(provider, name), version.to_string());
        self
    }

    /// Make install/configure of `name` fail
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn installed(&self, provider: &str, name: &str) -> Option<String> {
        self.packages.lock().unwrap().get(&key(provider, name)).cloned()
    }
}

impl StateCollector for MemorySystem {
    fn observe(&self, provider: &str, kind: ResourceKind, name: &str) -> Result<Option<Document>> {
        Ok(match kind {
            ResourceKind::Package => self.installed(provider, name).map(|version| {
                Document::from_pairs([("version", Document::from(version))])
            }),
            ResourceKind::Config => self.config.lock().unwrap().get(&key(provider, name)).cloned(),
        })
    }
}

impl Backend for MemorySystem {
    fn install(&self, provider: &str, name: &str, version: Option<&str>) -> Result<()> {
        if self.failing.contains(name) {
            bail!("{provider} install {name} exited with status 1");
        }
        let version = version
            .map(str::to_string)
            .or_else(|| self.latest.get(&key(provider, name)).cloned())
            .unwrap_or_else(|| "0.0.0".to_string());
        self.installs.lock().unwrap().push(format!("{provider}:{name}"));
        self.packages.lock().unwrap().insert(key(provider, name), version);
        Ok(())
    }

    fn remove(&self, provider: &str, name: &str) -> Result<()> {
        self.packages.lock().unwrap().remove(&key(provider, name));
        Ok(())
    }

    fn configure(&self, provider: &str, name: &str, value: &Document) -> Result<()> {
        if self.failing.contains(name) {
            bail!("{provider} rejected {name}");
        }
        self.config
            .lock()
            .unwrap()
            .insert(key(provider, name), value.clone());
        Ok(())
    }

    fn unconfigure(&self, provider: &str, name: &str) -> Result<()> {
        self.config.lock().unwrap().remove(&key(provider, name));
        Ok(())
    }
}

impl Resolver for MemorySystem {
    fn latest(&self, provider: &str, name: &str) -> Result<Option<String>> {
        Ok(self.latest.get(&key(provider, name)).cloned())
    }
}
