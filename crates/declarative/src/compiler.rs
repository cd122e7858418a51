//! Compiler: desired-state document to ordered steps
//!
//! The desired document is keyed by provider. Package providers take
//! `packages` and `config` sections; the built-in `files` provider maps
//! paths to content:
//!
//! ```yaml
//! brew:
//!   packages:
//!     - ripgrep
//!     - fd@9.0.0
//!     - { name: wget, ensure: absent }
//! git:
//!   config:
//!     user: { email: me@example.com }
//! files:
//!   ~/.config/starship.toml: |
//!     format = "$all"
//!   ~/.old_profile: { ensure: absent }
//! ```
//!
//! Steps are sorted by phase (every install before any configuration) and
//! then by declaration order. A resource declared twice keeps its first
//! position and its last declaration.

use crate::context::Resolver;
use crate::document::{Document, Scalar};
use crate::error::{Error, Result};
use crate::step::{ConfigStep, Ensure, FILES_PROVIDER, FileStep, PackageStep, SharedStep, StepKey};
use crate::types::ReproducibilityMode;
use lockfile::Lockfile;
use regex::Regex;
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@?[A-Za-z0-9][A-Za-z0-9._+/-]*$").expect("valid package name pattern")
});

/// Providers the compiler accepts. `files` is always present.
#[derive(Debug, Clone)]
pub struct ProviderSet {
    names: BTreeSet<String>,
}

impl Default for ProviderSet {
    fn default() -> Self {
        Self {
            names: BTreeSet::from([FILES_PROVIDER.to_string()]),
        }
    }
}

impl ProviderSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        set.names.extend(names.into_iter().map(Into::into));
        set
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// A package as written in a layer, before version resolution
#[derive(Debug, Clone, PartialEq, Eq)]
struct PackageDecl {
    name: String,
    version: Option<String>,
    ensure: Ensure,
}

/// Turns a desired-state document into steps
pub struct Compiler<'a> {
    providers: &'a ProviderSet,
    resolver: &'a dyn Resolver,
    lockfile: Option<&'a Lockfile>,
    mode: ReproducibilityMode,
}

impl<'a> Compiler<'a> {
    pub fn new(
        providers: &'a ProviderSet,
        resolver: &'a dyn Resolver,
        mode: ReproducibilityMode,
    ) -> Self {
        Self {
            providers,
            resolver,
            lockfile: None,
            mode,
        }
    }

    /// Resolve against this lockfile in `locked` and `frozen` modes
    pub fn with_lockfile(mut self, lockfile: &'a Lockfile) -> Self {
        self.lockfile = Some(lockfile);
        self
    }

    /// Compile the whole document. Nothing is returned on error.
    pub fn compile(&self, desired: &Document) -> Result<Vec<SharedStep>> {
        let root = match desired {
            Document::Mapping(root) => root,
            d if d.is_null() => return Ok(Vec::new()),
            other => {
                return Err(Error::MalformedResource {
                    location: "<root>".to_string(),
                    message: format!("expected a mapping of providers, found {other}"),
                });
            }
        };

        let mut steps = Steps::default();
        for (provider, body) in root {
            if !self.providers.contains(provider) {
                return Err(Error::UnknownProvider {
                    provider: provider.clone(),
                    location: provider.clone(),
                });
            }
            if provider == FILES_PROVIDER {
                compile_files(body, &mut steps)?;
            } else {
                self.compile_provider(provider, body, &mut steps)?;
            }
        }

        let mut steps = steps.into_vec();
        steps.sort_by_key(|step| step.phase());
        log::debug!("Compiled {} steps in {} mode", steps.len(), self.mode);
        Ok(steps)
    }

    fn compile_provider(&self, provider: &str, body: &Document, steps: &mut Steps) -> Result<()> {
        if body.is_null() {
            return Ok(());
        }
        let sections = body.as_mapping().ok_or_else(|| Error::MalformedResource {
            location: provider.to_string(),
            message: "expected a mapping with 'packages' and/or 'config'".to_string(),
        })?;

        for (section, value) in sections {
            let location = format!("{provider}.{section}");
            match section.as_str() {
                "packages" => {
                    for decl in parse_packages(&location, value)? {
                        let step = self.package_step(provider, decl)?;
                        steps.push(Arc::new(step));
                    }
                }
                "config" => {
                    let mut flat = IndexMap::new();
                    flatten_config("", value, &location, &mut flat)?;
                    for (key, value) in flat {
                        let step = match value {
                            Some(v) => ConfigStep::set(provider, &key, v),
                            None => ConfigStep::unset(provider, &key),
                        };
                        steps.push(Arc::new(step));
                    }
                }
                other => {
                    return Err(Error::MalformedResource {
                        location,
                        message: format!("unknown section '{other}'"),
                    });
                }
            }
        }
        Ok(())
    }

    fn package_step(&self, provider: &str, decl: PackageDecl) -> Result<PackageStep> {
        if decl.ensure == Ensure::Absent {
            return Ok(PackageStep::absent(provider, &decl.name));
        }
        let version = self.resolve(provider, &decl)?;
        Ok(PackageStep::present(provider, &decl.name, version))
    }

    /// Pick the version for a present package under the current mode
    fn resolve(&self, provider: &str, decl: &PackageDecl) -> Result<Option<String>> {
        let key = format!("{provider}:{}", decl.name);
        let locked = self
            .lockfile
            .and_then(|lock| lock.version_of(&key))
            .map(str::to_string);

        match self.mode {
            ReproducibilityMode::Intent => match &decl.version {
                Some(pin) => Ok(Some(pin.clone())),
                None => self.latest(provider, &decl.name, &key),
            },
            ReproducibilityMode::Locked => match decl.version.clone().or(locked) {
                Some(version) => Ok(Some(version)),
                None => self.latest(provider, &decl.name, &key),
            },
            ReproducibilityMode::Frozen => {
                // Upstream is consulted too: a newer release is drift
                let resolved = match &decl.version {
                    Some(pin) => Some(pin.clone()),
                    None => self
                        .latest(provider, &decl.name, &key)?
                        .or_else(|| locked.clone()),
                };
                let empty = Lockfile::new();
                let lock = self.lockfile.unwrap_or(&empty);
                match lock.verify_against([(key.as_str(), resolved.as_deref())]).pop() {
                    Some(drift) => Err(Error::FrozenMismatch {
                        package: key,
                        locked: drift.locked,
                        resolved: drift.resolved,
                    }),
                    None => Ok(resolved),
                }
            }
        }
    }

    fn latest(&self, provider: &str, name: &str, key: &str) -> Result<Option<String>> {
        let version = self
            .resolver
            .latest(provider, name)
            .map_err(|source| Error::Resolve {
                package: key.to_string(),
                source,
            })?;
        if let Some(v) = &version {
            log::debug!("Resolved {key} to {v}");
        }
        Ok(version)
    }
}

/// Steps in declaration order, deduplicated by resource identity
#[derive(Default)]
struct Steps {
    steps: Vec<SharedStep>,
    index: HashMap<StepKey, usize>,
}

impl Steps {
    fn push(&mut self, step: SharedStep) {
        let key = StepKey::of(step.as_ref());
        match self.index.get(&key) {
            Some(&i) => {
                log::debug!("{} declared again, last declaration wins", step.id());
                self.steps[i] = step;
            }
            None => {
                self.index.insert(key, self.steps.len());
                self.steps.push(step);
            }
        }
    }

    fn into_vec(self) -> Vec<SharedStep> {
        self.steps
    }
}

fn malformed(location: &str, message: impl Into<String>) -> Error {
    Error::MalformedResource {
        location: location.to_string(),
        message: message.into(),
    }
}

fn parse_packages(location: &str, value: &Document) -> Result<Vec<PackageDecl>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let entries = value
        .as_sequence()
        .ok_or_else(|| malformed(location, "expected a list of packages"))?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| parse_package(&format!("{location}[{i}]"), entry))
        .collect()
}

fn parse_package(location: &str, entry: &Document) -> Result<PackageDecl> {
    let decl = match entry {
        Document::Mapping(fields) => {
            if let Some(unknown) = fields
                .keys()
                .find(|k| !matches!(k.as_str(), "name" | "version" | "ensure"))
            {
                return Err(malformed(location, format!("unknown field '{unknown}'")));
            }
            let name = fields
                .get("name")
                .and_then(Document::as_str)
                .ok_or_else(|| malformed(location, "missing 'name'"))?;
            let version = fields
                .get("version")
                .map(|v| parse_version(location, v))
                .transpose()?;
            let ensure = match fields.get("ensure") {
                None => Ensure::Present,
                Some(e) => e
                    .as_str()
                    .ok_or_else(|| malformed(location, "'ensure' must be a string"))?
                    .parse()
                    .map_err(|message: String| malformed(location, message))?,
            };
            PackageDecl {
                name: name.to_string(),
                version,
                ensure,
            }
        }
        other => {
            let spec = other
                .as_str()
                .ok_or_else(|| malformed(location, "expected a package name or mapping"))?;
            let (name, version) = match spec.rfind('@') {
                Some(at) if at > 0 => (&spec[..at], Some(spec[at + 1..].to_string())),
                _ => (spec, None),
            };
            PackageDecl {
                name: name.to_string(),
                version,
                ensure: Ensure::Present,
            }
        }
    };

    if !PACKAGE_NAME.is_match(&decl.name) {
        return Err(malformed(location, format!("invalid package name '{}'", decl.name)));
    }
    if decl.version.as_deref().is_some_and(str::is_empty) {
        return Err(malformed(location, "empty version"));
    }
    Ok(decl)
}

/// Version text as written. Unquoted `1.10` reaches us as the float 1.1,
/// so floats are refused instead of silently losing digits.
fn parse_version(location: &str, value: &Document) -> Result<String> {
    match value {
        Document::Scalar(Scalar::Str(s)) => Ok(s.clone()),
        Document::Scalar(Scalar::Int(i)) => Ok(i.to_string()),
        Document::Scalar(Scalar::Float(x)) => Err(malformed(
            location,
            format!("version {x} was read as a number; quote it to keep every digit"),
        )),
        _ => Err(malformed(location, "'version' must be a string")),
    }
}

/// Flatten nested config mappings into dotted keys.
///
/// `None` means the key is to be unset.
fn flatten_config(
    prefix: &str,
    value: &Document,
    location: &str,
    out: &mut IndexMap<String, Option<Document>>,
) -> Result<()> {
    match value {
        Document::Mapping(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_config(&path, child, location, out)?;
            }
            Ok(())
        }
        _ if prefix.is_empty() => {
            if value.is_null() {
                Ok(())
            } else {
                Err(malformed(location, "expected a mapping of settings"))
            }
        }
        v if v.is_null() => {
            out.insert(prefix.to_string(), None);
            Ok(())
        }
        v => {
            out.insert(prefix.to_string(), Some(v.clone()));
            Ok(())
        }
    }
}

fn compile_files(body: &Document, steps: &mut Steps) -> Result<()> {
    if body.is_null() {
        return Ok(());
    }
    let files = body
        .as_mapping()
        .ok_or_else(|| malformed(FILES_PROVIDER, "expected a mapping of paths"))?;

    for (raw_path, spec) in files {
        let location = format!("{FILES_PROVIDER}.{raw_path}");
        let path = PathBuf::from(shellexpand::tilde(raw_path).into_owned());

        let step = match spec {
            Document::Mapping(fields) => {
                let ensure = match fields.get("ensure").and_then(Document::as_str) {
                    None => Ensure::Present,
                    Some(e) => e.parse().map_err(|message: String| malformed(&location, message))?,
                };
                match ensure {
                    Ensure::Absent => FileStep::delete(path),
                    Ensure::Present => {
                        let content = fields
                            .get("content")
                            .and_then(Document::scalar_text)
                            .ok_or_else(|| malformed(&location, "missing 'content'"))?;
                        FileStep::write(path, content)
                    }
                }
            }
            Document::Scalar(_) if !spec.is_null() => {
                let content = spec.scalar_text().unwrap_or_default();
                FileStep::write(path, content)
            }
            _ => return Err(malformed(&location, "expected file content or a mapping")),
        };
        steps.push(Arc::new(step));
    }
    Ok(())
}
