//! Differ: typed differences between observed and desired documents
//!
//! Both documents are keyed by provider at the top level. Below that,
//! mappings are walked key by key; any other value is compared whole by
//! [`Document::display_form`].

use crate::document::Document;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

/// Kind of difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    /// Only desired has it
    Add,
    /// Both have it with different values
    Change,
    /// Only observed has it
    Remove,
}

impl DiffKind {
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Change => '~',
            Self::Remove => '-',
        }
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Remove => "remove",
        })
    }
}

/// One detected difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub kind: DiffKind,
    pub provider: String,
    /// Dot-joined field path below the provider, empty for the provider itself
    pub key: String,
    /// Observed value
    pub source: Option<Document>,
    /// Desired value
    pub dest: Option<Document>,
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.key.is_empty() {
            self.provider.clone()
        } else {
            format!("{}.{}", self.provider, self.key)
        };
        match self.kind {
            DiffKind::Add => write!(f, "+ {}: {}", path, show(&self.dest)),
            DiffKind::Remove => write!(f, "- {}: {}", path, show(&self.source)),
            DiffKind::Change => write!(
                f,
                "~ {}: {} -> {}",
                path,
                show(&self.source),
                show(&self.dest)
            ),
        }
    }
}

fn show(value: &Option<Document>) -> String {
    value
        .as_ref()
        .map(Document::display_form)
        .unwrap_or_else(|| "null".to_string())
}

/// Compares documents, optionally restricted to some providers
#[derive(Debug, Clone, Default)]
pub struct Differ {
    providers: Option<BTreeSet<String>>,
}

impl Differ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only compare the named providers
    pub fn with_providers<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            providers: Some(providers.into_iter().map(Into::into).collect()),
        }
    }

    pub fn allows(&self, provider: &str) -> bool {
        self.providers
            .as_ref()
            .is_none_or(|allowed| allowed.contains(provider))
    }

    /// Diff `source` (observed) against `dest` (desired)
    pub fn compare(&self, source: &Document, dest: &Document) -> Vec<Diff> {
        let (Some(src), Some(dst)) = (top_level(source), top_level(dest)) else {
            // Not keyed by provider at all: compare whole
            let mut diffs = Vec::new();
            walk("", "", Some(source), Some(dest), &mut diffs);
            return diffs;
        };

        let providers: BTreeSet<&String> = src.keys().chain(dst.keys()).collect();
        let mut diffs = Vec::new();

        for provider in providers {
            if !self.allows(provider) {
                continue;
            }
            match (src.get(provider), dst.get(provider)) {
                (Some(s), Some(d)) => walk(provider, "", Some(s), Some(d), &mut diffs),
                (Some(s), None) => expand(provider, s, DiffKind::Remove, &mut diffs),
                (None, Some(d)) => expand(provider, d, DiffKind::Add, &mut diffs),
                (None, None) => {}
            }
        }

        diffs
    }
}

/// Diff two documents with no provider restriction
pub fn compare(source: &Document, dest: &Document) -> Vec<Diff> {
    Differ::new().compare(source, dest)
}

static EMPTY: LazyLock<IndexMap<String, Document>> = LazyLock::new(IndexMap::new);

fn top_level(doc: &Document) -> Option<&IndexMap<String, Document>> {
    match doc {
        Document::Mapping(m) => Some(m),
        d if d.is_null() => Some(&*EMPTY),
        _ => None,
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// A provider present on one side only: one diff per top-level field
fn expand(provider: &str, value: &Document, kind: DiffKind, diffs: &mut Vec<Diff>) {
    match value.as_mapping() {
        Some(fields) => {
            for (key, field) in fields {
                diffs.push(one_sided(provider, key.clone(), field, kind));
            }
        }
        None => diffs.push(one_sided(provider, String::new(), value, kind)),
    }
}

fn one_sided(provider: &str, key: String, value: &Document, kind: DiffKind) -> Diff {
    let (source, dest) = match kind {
        DiffKind::Remove => (Some(value.clone()), None),
        _ => (None, Some(value.clone())),
    };
    Diff {
        kind,
        provider: provider.to_string(),
        key,
        source,
        dest,
    }
}

fn walk(
    provider: &str,
    path: &str,
    source: Option<&Document>,
    dest: Option<&Document>,
    diffs: &mut Vec<Diff>,
) {
    match (source, dest) {
        (Some(Document::Mapping(s)), Some(Document::Mapping(d))) => {
            let keys: BTreeSet<&String> = s.keys().chain(d.keys()).collect();
            for key in keys {
                walk(provider, &join(path, key), s.get(key), d.get(key), diffs);
            }
        }
        (Some(s), Some(d)) => {
            if !s.equivalent(d) {
                diffs.push(Diff {
                    kind: DiffKind::Change,
                    provider: provider.to_string(),
                    key: path.to_string(),
                    source: Some(s.clone()),
                    dest: Some(d.clone()),
                });
            }
        }
        (Some(s), None) => diffs.push(one_sided(provider, path.to_string(), s, DiffKind::Remove)),
        (None, Some(d)) => diffs.push(one_sided(provider, path.to_string(), d, DiffKind::Add)),
        (None, None) => {}
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub additions: usize,
    pub changes: usize,
    pub removals: usize,
}

impl DiffSummary {
    pub fn from_diffs<'a, I>(diffs: I) -> Self
    where
        I: IntoIterator<Item = &'a Diff>,
    {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.kind {
                DiffKind::Add => summary.additions += 1,
                DiffKind::Change => summary.changes += 1,
                DiffKind::Remove => summary.removals += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.changes + self.removals
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by provider
pub fn group_by_provider<'a, I>(diffs: I) -> BTreeMap<&'a str, Vec<&'a Diff>>
where
    I: IntoIterator<Item = &'a Diff>,
{
    let mut groups: BTreeMap<&str, Vec<&Diff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.provider.as_str()).or_default().push(diff);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Document {
        serde_yaml::from_str(s).unwrap()
    }

    fn keys(diffs: &[Diff], kind: DiffKind) -> Vec<String> {
        diffs
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| format!("{}:{}", d.provider, d.key))
            .collect()
    }

    #[test]
    fn test_add_change_remove() {
        let observed = yaml("{brew: {ripgrep: {version: 14.0.0}, wget: {version: '1.21'}}}");
        let desired = yaml("{brew: {ripgrep: {version: 14.1.0}, fd: {version: 9.0.0}}}");

        let diffs = compare(&observed, &desired);

        assert_eq!(keys(&diffs, DiffKind::Add), vec!["brew:fd"]);
        assert_eq!(keys(&diffs, DiffKind::Change), vec!["brew:ripgrep.version"]);
        assert_eq!(keys(&diffs, DiffKind::Remove), vec!["brew:wget"]);

        let change = diffs.iter().find(|d| d.kind == DiffKind::Change).unwrap();
        assert_eq!(change.source, Some(Document::from("14.0.0")));
        assert_eq!(change.dest, Some(Document::from("14.1.0")));
    }

    #[test]
    fn test_equal_by_display_form() {
        let observed = yaml("{git: {config: {core.autocrlf: 'false', depth: '3'}}}");
        let desired = yaml("{git: {config: {core.autocrlf: false, depth: 3}}}");
        assert!(compare(&observed, &desired).is_empty());
    }

    #[test]
    fn test_provider_on_one_side_expands_per_field() {
        let observed = yaml("{}");
        let desired = yaml("{npm: {typescript: {version: '5.4'}, eslint: {}}}");

        let diffs = compare(&observed, &desired);
        assert_eq!(keys(&diffs, DiffKind::Add), vec!["npm:eslint", "npm:typescript"]);
    }

    #[test]
    fn test_allow_list_skips_other_providers() {
        let observed = yaml("{brew: {a: 1}, npm: {b: 1}}");
        let desired = yaml("{brew: {a: 2}, npm: {b: 2}, cargo: {c: 1}}");

        let diffs = Differ::with_providers(["npm"]).compare(&observed, &desired);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].provider, "npm");
    }

    #[test]
    fn test_compare_is_symmetric() {
        let a = yaml("{brew: {ripgrep: {version: 14.0.0}, jq: {}}, git: {user: x}}");
        let b = yaml("{brew: {ripgrep: {version: 14.1.0}, fd: {}}, npm: {tsc: {}}}");

        let forward = compare(&a, &b);
        let backward = compare(&b, &a);
        assert_eq!(forward.len(), backward.len());

        for diff in &forward {
            let mirrored = match diff.kind {
                DiffKind::Add => DiffKind::Remove,
                DiffKind::Remove => DiffKind::Add,
                DiffKind::Change => DiffKind::Change,
            };
            let other = backward
                .iter()
                .find(|d| d.provider == diff.provider && d.key == diff.key)
                .unwrap();
            assert_eq!(other.kind, mirrored);
            assert_eq!(other.source, diff.dest);
            assert_eq!(other.dest, diff.source);
        }
    }

    #[test]
    fn test_summary_and_grouping() {
        let diffs = compare(
            &yaml("{brew: {a: 1, b: 1}, npm: {c: 1}}"),
            &yaml("{brew: {a: 2, d: 1}}"),
        );
        let summary = DiffSummary::from_diffs(&diffs);
        assert_eq!(summary.additions, 1);
        assert_eq!(summary.changes, 1);
        assert_eq!(summary.removals, 2);
        assert!(summary.has_changes());

        let groups = group_by_provider(&diffs);
        assert_eq!(groups["brew"].len(), 3);
        assert_eq!(groups["npm"].len(), 1);
    }

    #[test]
    fn test_display() {
        let diffs = compare(&yaml("{brew: {}}"), &yaml("{brew: {ripgrep: {version: 14.1.0}}}"));
        assert_eq!(diffs[0].to_string(), "+ brew.ripgrep: {version: 14.1.0}");
    }
}
