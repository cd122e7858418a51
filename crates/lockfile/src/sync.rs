//! Sync and conflict engine
//!
//! Compares a local and a remote lockfile package by package using the
//! version vector stored in each entry's provenance, decides what a merge
//! would do, and surfaces the packages that both machines changed
//! independently.
//!
//! The calling sync flow is:
//! fetch, classify, then either merge and continue or block until the
//! manual conflicts are resolved; after that pull, plan, apply, record and
//! optionally push. [`SyncResult::outcome`] is the gate for that flow.

use crate::error::{Error, Result};
use crate::lock::{Lockfile, PackageLockInfo};
use crate::vector::{CausalRelation, classify};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Why a package is in conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides changed an entry that existed in the base
    BothModified,
    /// Both sides added packages since the base: either distinct keys,
    /// reported once for all of them, or the same key
    BothAdded,
    /// Local removed the entry, remote modified it
    RemovedLocally,
    /// Remote removed the entry, local modified it
    RemovedRemotely,
}

impl ConflictKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BothModified => "both modified",
            Self::BothAdded => "added both",
            Self::RemovedLocally => "removed locally",
            Self::RemovedRemotely => "removed remotely",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which side wins for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepLocal,
    TakeRemote,
    /// Keep the additions of both sides
    KeepBoth,
}

/// What a merge does with one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Both sides agree
    Unchanged,
    /// Local entry (or local absence) wins
    KeepLocal,
    /// Remote entry (or remote absence) wins
    TakeRemote,
    /// Needs a resolution, see the matching [`LockConflict`]
    Conflict,
}

/// One package whose two entries diverged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConflict {
    pub package: String,
    pub kind: ConflictKind,
    pub relation: CausalRelation,
    pub local: Option<PackageLockInfo>,
    pub remote: Option<PackageLockInfo>,
    pub base: Option<PackageLockInfo>,
    /// Set when one side is unchanged from base, both sides agree, or the
    /// additions are disjoint
    pub auto_resolution: Option<Resolution>,
}

impl LockConflict {
    pub fn is_resolvable(&self) -> bool {
        self.auto_resolution.is_some()
    }

    pub fn local_version(&self) -> Option<&str> {
        self.local.as_ref().map(|i| i.version.as_str())
    }

    pub fn remote_version(&self) -> Option<&str> {
        self.remote.as_ref().map(|i| i.version.as_str())
    }
}

/// Where the caller's sync flow goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Nothing to exchange
    Synced,
    /// Remote is ahead; pull then plan and apply
    Pull,
    /// Local is ahead; push
    Push,
    /// Both advanced and every conflict resolves automatically
    Merge,
    /// Manual conflicts are outstanding
    Blocked,
}

/// One row of the conflict table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRow {
    pub package: String,
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub local_version: Option<String>,
    pub remote_version: Option<String>,
    pub resolvable: bool,
}

/// Aggregate figures for the conflict report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub relation: CausalRelation,
    pub total_conflicts: usize,
    pub auto_resolvable: usize,
    pub needs_merge: bool,
}

/// Result of comparing two lockfiles
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Relation of the local lockfile vector to the remote one
    pub relation: CausalRelation,
    pub decisions: BTreeMap<String, Decision>,
    pub conflicts: Vec<LockConflict>,
    local: Lockfile,
    remote: Lockfile,
}

/// Compare `local` and `remote`, optionally against their common `base`.
///
/// Without a base, one-sided entries are treated as additions and a
/// concurrent change is never auto-resolvable.
pub fn sync(local: &Lockfile, remote: &Lockfile, base: Option<&Lockfile>) -> SyncResult {
    let keys: BTreeSet<&String> = local.packages.keys().chain(remote.packages.keys()).collect();

    let mut decisions = BTreeMap::new();
    let mut conflicts = Vec::new();

    for key in keys {
        let l = local.get(key);
        let r = remote.get(key);
        let b = base.and_then(|b| b.get(key));

        let (decision, conflict) = decide(key, l, r, b, base.is_some());
        if let Some(conflict) = conflict {
            log::debug!(
                "Conflict on {}: {} (resolvable: {})",
                key,
                conflict.kind,
                conflict.is_resolvable()
            );
            conflicts.push(conflict);
        }
        decisions.insert(key.clone(), decision);
    }

    let relation = classify(&local.vector, &remote.vector);
    if let Some(base) = base
        && let Some(conflict) = disjoint_additions(local, remote, base, relation)
    {
        log::debug!("Both sides added packages: {}", conflict.package);
        conflicts.push(conflict);
    }
    log::info!(
        "Lockfile sync: local is {} ({} conflict(s))",
        relation,
        conflicts.len()
    );

    SyncResult {
        relation,
        decisions,
        conflicts,
        local: local.clone(),
        remote: remote.clone(),
    }
}

/// One resolvable conflict covering keys each side added on its own since
/// `base`, when both sides did
fn disjoint_additions(
    local: &Lockfile,
    remote: &Lockfile,
    base: &Lockfile,
    relation: CausalRelation,
) -> Option<LockConflict> {
    let added = |side: &Lockfile, other: &Lockfile| -> Vec<String> {
        side.packages
            .keys()
            .filter(|k| base.get(k).is_none() && other.get(k).is_none())
            .cloned()
            .collect()
    };
    let local_added = added(local, remote);
    let remote_added = added(remote, local);
    if local_added.is_empty() || remote_added.is_empty() {
        return None;
    }

    let mut keys: Vec<String> = local_added.into_iter().chain(remote_added).collect();
    keys.sort();
    Some(LockConflict {
        package: keys.join(", "),
        kind: ConflictKind::BothAdded,
        relation,
        local: None,
        remote: None,
        base: None,
        auto_resolution: Some(Resolution::KeepBoth),
    })
}

fn decide(
    key: &str,
    local: Option<&PackageLockInfo>,
    remote: Option<&PackageLockInfo>,
    base: Option<&PackageLockInfo>,
    has_base: bool,
) -> (Decision, Option<LockConflict>) {
    let conflict = |kind, relation, auto_resolution| LockConflict {
        package: key.to_string(),
        kind,
        relation,
        local: local.cloned(),
        remote: remote.cloned(),
        base: base.cloned(),
        auto_resolution,
    };

    match (local, remote) {
        (Some(l), Some(r)) => {
            let relation = classify(&l.provenance.version_vector, &r.provenance.version_vector);
            match relation {
                CausalRelation::Equal if l.version == r.version => (Decision::Unchanged, None),
                CausalRelation::Before => (Decision::TakeRemote, None),
                CausalRelation::After => (Decision::KeepLocal, None),
                CausalRelation::Equal | CausalRelation::Concurrent => {
                    if has_base && base.is_none() {
                        // Added on both sides since the base
                        let auto = (l.version == r.version).then_some(Resolution::KeepLocal);
                        return (
                            Decision::Conflict,
                            Some(conflict(ConflictKind::BothAdded, relation, auto)),
                        );
                    }
                    if l.version == r.version {
                        return (Decision::KeepLocal, None);
                    }
                    let auto = base.and_then(|b| {
                        if l.version == b.version {
                            Some(Resolution::TakeRemote)
                        } else if r.version == b.version {
                            Some(Resolution::KeepLocal)
                        } else {
                            None
                        }
                    });
                    (
                        Decision::Conflict,
                        Some(conflict(ConflictKind::BothModified, relation, auto)),
                    )
                }
            }
        }
        (Some(l), None) => match base {
            // Remote removed it; fine unless local changed it meanwhile
            Some(b) if l.version == b.version => (Decision::TakeRemote, None),
            Some(_) => (
                Decision::Conflict,
                Some(conflict(
                    ConflictKind::RemovedRemotely,
                    CausalRelation::Concurrent,
                    None,
                )),
            ),
            None => (Decision::KeepLocal, None),
        },
        (None, Some(r)) => match base {
            Some(b) if r.version == b.version => (Decision::KeepLocal, None),
            Some(_) => (
                Decision::Conflict,
                Some(conflict(
                    ConflictKind::RemovedLocally,
                    CausalRelation::Concurrent,
                    None,
                )),
            ),
            None => (Decision::TakeRemote, None),
        },
        (None, None) => (Decision::Unchanged, None),
    }
}

impl SyncResult {
    /// Conflicts that can be merged without asking
    pub fn auto_resolvable(&self) -> impl Iterator<Item = &LockConflict> {
        self.conflicts.iter().filter(|c| c.is_resolvable())
    }

    /// Conflicts that block an automatic merge
    pub fn manual_conflicts(&self) -> impl Iterator<Item = &LockConflict> {
        self.conflicts.iter().filter(|c| !c.is_resolvable())
    }

    /// The gate used by the sync flow to proceed, warn or abort
    pub fn has_manual_conflicts(&self) -> bool {
        self.manual_conflicts().next().is_some()
    }

    /// Whether a merge commit is required (both sides advanced)
    pub fn needs_merge(&self) -> bool {
        self.relation == CausalRelation::Concurrent
    }

    pub fn outcome(&self) -> SyncOutcome {
        if self.has_manual_conflicts() {
            return SyncOutcome::Blocked;
        }
        match self.relation {
            CausalRelation::Equal if self.conflicts.is_empty() => SyncOutcome::Synced,
            CausalRelation::Before => SyncOutcome::Pull,
            CausalRelation::After => SyncOutcome::Push,
            CausalRelation::Equal | CausalRelation::Concurrent => SyncOutcome::Merge,
        }
    }

    pub fn summary(&self) -> SyncSummary {
        SyncSummary {
            relation: self.relation,
            total_conflicts: self.conflicts.len(),
            auto_resolvable: self.auto_resolvable().count(),
            needs_merge: self.needs_merge(),
        }
    }

    pub fn rows(&self) -> Vec<ConflictRow> {
        self.conflicts
            .iter()
            .map(|c| ConflictRow {
                package: c.package.clone(),
                kind: c.kind,
                local_version: c.local_version().map(str::to_string),
                remote_version: c.remote_version().map(str::to_string),
                resolvable: c.is_resolvable(),
            })
            .collect()
    }

    /// Merge both lockfiles, refusing while manual conflicts remain
    pub fn merge(&self) -> Result<Lockfile> {
        self.merge_with(&BTreeMap::new())
    }

    /// Merge both lockfiles using caller-chosen resolutions for conflicts.
    ///
    /// Supplied resolutions override automatic ones. The merged vector is
    /// the entry-wise maximum of both sides.
    pub fn merge_with(&self, resolutions: &BTreeMap<String, Resolution>) -> Result<Lockfile> {
        for package in resolutions.keys() {
            if !self.conflicts.iter().any(|c| &c.package == package) {
                return Err(Error::UnknownConflict(package.clone()));
            }
        }

        let unresolved = self
            .conflicts
            .iter()
            .filter(|c| c.auto_resolution.is_none() && !resolutions.contains_key(&c.package))
            .count();
        if unresolved > 0 {
            return Err(Error::ManualConflicts(unresolved));
        }

        let mut merged = Lockfile::new();
        merged.vector = self.local.vector.merged(&self.remote.vector);

        for (key, decision) in &self.decisions {
            let side = match decision {
                Decision::Unchanged | Decision::KeepLocal => Resolution::KeepLocal,
                Decision::TakeRemote => Resolution::TakeRemote,
                Decision::Conflict => resolutions
                    .get(key)
                    .copied()
                    .or_else(|| {
                        self.conflicts
                            .iter()
                            .find(|c| &c.package == key)
                            .and_then(|c| c.auto_resolution)
                    })
                    .ok_or(Error::ManualConflicts(1))?,
            };

            let entry = match side {
                Resolution::KeepLocal => self.local.get(key),
                Resolution::TakeRemote => self.remote.get(key),
                Resolution::KeepBoth => self.local.get(key).or_else(|| self.remote.get(key)),
            };
            if let Some(info) = entry {
                merged.packages.insert(key.clone(), info.clone());
            }
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Provenance;
    use crate::vector::VersionVector;

    fn info<const N: usize>(version: &str, machine: &str, vv: [(&str, u64); N]) -> PackageLockInfo {
        PackageLockInfo {
            version: version.to_string(),
            provenance: Provenance {
                machine_id: machine.to_string(),
                version_vector: VersionVector::from(vv),
            },
        }
    }

    fn lockfile<const N: usize>(
        vector: [(&str, u64); N],
        packages: Vec<(&str, PackageLockInfo)>,
    ) -> Lockfile {
        Lockfile {
            vector: VersionVector::from(vector),
            packages: packages
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            ..Lockfile::new()
        }
    }

    #[test]
    fn test_identical_lockfiles_are_synced() {
        let lock = lockfile(
            [("A", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 1)]))],
        );
        let result = sync(&lock, &lock, None);
        assert_eq!(result.relation, CausalRelation::Equal);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.outcome(), SyncOutcome::Synced);
        assert_eq!(result.merge().unwrap().packages, lock.packages);
    }

    #[test]
    fn test_remote_ahead_means_pull() {
        let local = lockfile(
            [("A", 2), ("B", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 2), ("B", 1)]))],
        );
        let remote = lockfile(
            [("A", 2), ("B", 2)],
            vec![("brew:ripgrep", info("14.1.0", "B", [("A", 2), ("B", 2)]))],
        );

        let result = sync(&local, &remote, None);
        assert_eq!(result.relation, CausalRelation::Before);
        assert_eq!(result.decisions["brew:ripgrep"], Decision::TakeRemote);
        assert_eq!(result.outcome(), SyncOutcome::Pull);

        let merged = result.merge().unwrap();
        assert_eq!(merged.version_of("brew:ripgrep"), Some("14.1.0"));
        assert_eq!(merged.vector, VersionVector::from([("A", 2), ("B", 2)]));
    }

    #[test]
    fn test_local_ahead_means_push() {
        let local = lockfile(
            [("A", 3), ("B", 1)],
            vec![("brew:ripgrep", info("14.1.0", "A", [("A", 3), ("B", 1)]))],
        );
        let remote = lockfile(
            [("A", 2), ("B", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 2), ("B", 1)]))],
        );

        let result = sync(&local, &remote, None);
        assert_eq!(result.relation, CausalRelation::After);
        assert_eq!(result.outcome(), SyncOutcome::Push);
    }

    #[test]
    fn test_concurrent_modification_without_base_is_manual() {
        let local = lockfile(
            [("A", 2), ("B", 2)],
            vec![("brew:ripgrep", info("14.1.0", "B", [("A", 2), ("B", 2)]))],
        );
        let remote = lockfile(
            [("A", 3), ("B", 1)],
            vec![("brew:ripgrep", info("13.0.0", "A", [("A", 3), ("B", 1)]))],
        );

        let result = sync(&local, &remote, None);
        assert_eq!(result.relation, CausalRelation::Concurrent);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictKind::BothModified);
        assert!(result.has_manual_conflicts());
        assert_eq!(result.outcome(), SyncOutcome::Blocked);
        assert!(matches!(result.merge(), Err(Error::ManualConflicts(1))));

        let resolutions = BTreeMap::from([("brew:ripgrep".to_string(), Resolution::TakeRemote)]);
        let merged = result.merge_with(&resolutions).unwrap();
        assert_eq!(merged.version_of("brew:ripgrep"), Some("13.0.0"));
    }

    #[test]
    fn test_one_side_unchanged_from_base_is_auto_resolvable() {
        let base = lockfile(
            [("A", 1), ("B", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 1), ("B", 1)]))],
        );
        // Local rewrote the entry at the same version, remote upgraded
        let local = lockfile(
            [("A", 2), ("B", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 2), ("B", 1)]))],
        );
        let remote = lockfile(
            [("A", 1), ("B", 2)],
            vec![("brew:ripgrep", info("14.1.0", "B", [("A", 1), ("B", 2)]))],
        );

        let result = sync(&local, &remote, Some(&base));
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::BothModified);
        assert_eq!(conflict.auto_resolution, Some(Resolution::TakeRemote));
        assert!(!result.has_manual_conflicts());
        assert_eq!(result.outcome(), SyncOutcome::Merge);

        let merged = result.merge().unwrap();
        assert_eq!(merged.version_of("brew:ripgrep"), Some("14.1.0"));
    }

    #[test]
    fn test_independent_additions_merge_without_collision() {
        let base = lockfile([("A", 1), ("B", 1)], vec![]);
        let local = lockfile(
            [("A", 2), ("B", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 2), ("B", 1)]))],
        );
        let remote = lockfile(
            [("A", 1), ("B", 2)],
            vec![("brew:fd", info("9.0.0", "B", [("A", 1), ("B", 2)]))],
        );

        let result = sync(&local, &remote, Some(&base));
        assert_eq!(result.relation, CausalRelation::Concurrent);
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::BothAdded);
        assert_eq!(conflict.package, "brew:fd, brew:ripgrep");
        assert!(conflict.is_resolvable());
        assert!(!result.has_manual_conflicts());
        assert_eq!(result.outcome(), SyncOutcome::Merge);
        assert_eq!(result.summary().auto_resolvable, 1);

        let merged = result.merge().unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.version_of("brew:ripgrep"), Some("14.0.0"));
        assert_eq!(merged.version_of("brew:fd"), Some("9.0.0"));
        assert_eq!(merged.vector, VersionVector::from([("A", 2), ("B", 2)]));
    }

    #[test]
    fn test_one_sided_addition_is_not_a_conflict() {
        let base = lockfile([("A", 1), ("B", 1)], vec![]);
        let local = lockfile(
            [("A", 2), ("B", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 2), ("B", 1)]))],
        );

        let result = sync(&local, &base, Some(&base));
        assert!(result.conflicts.is_empty());
        assert_eq!(result.outcome(), SyncOutcome::Push);
    }

    #[test]
    fn test_both_added_same_key() {
        let base = lockfile([("A", 1), ("B", 1)], vec![]);
        let local = lockfile(
            [("A", 2), ("B", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 2), ("B", 1)]))],
        );

        // Same version on both sides: no collision
        let remote = lockfile(
            [("A", 1), ("B", 2)],
            vec![("brew:ripgrep", info("14.0.0", "B", [("A", 1), ("B", 2)]))],
        );
        let result = sync(&local, &remote, Some(&base));
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictKind::BothAdded);
        assert!(result.conflicts[0].is_resolvable());

        // Different versions collide on the same key
        let remote = lockfile(
            [("A", 1), ("B", 2)],
            vec![("brew:ripgrep", info("13.0.0", "B", [("A", 1), ("B", 2)]))],
        );
        let result = sync(&local, &remote, Some(&base));
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictKind::BothAdded);
        assert!(!result.conflicts[0].is_resolvable());
    }

    #[test]
    fn test_removed_remotely_vs_modified_locally() {
        let base = lockfile(
            [("A", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 1)]))],
        );
        let local = lockfile(
            [("A", 2)],
            vec![("brew:ripgrep", info("14.1.0", "A", [("A", 2)]))],
        );
        let remote = lockfile([("A", 1), ("B", 1)], vec![]);

        let result = sync(&local, &remote, Some(&base));
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictKind::RemovedRemotely);
        assert!(result.has_manual_conflicts());
    }

    #[test]
    fn test_removal_of_unchanged_entry_is_taken() {
        let base = lockfile(
            [("A", 1)],
            vec![("brew:ripgrep", info("14.0.0", "A", [("A", 1)]))],
        );
        let remote = lockfile([("A", 1), ("B", 1)], vec![]);

        let result = sync(&base, &remote, Some(&base));
        assert!(result.conflicts.is_empty());
        assert_eq!(result.decisions["brew:ripgrep"], Decision::TakeRemote);
        assert!(result.merge().unwrap().is_empty());
    }

    #[test]
    fn test_summary_and_rows() {
        let local = lockfile(
            [("A", 2), ("B", 2)],
            vec![("brew:ripgrep", info("14.1.0", "B", [("A", 2), ("B", 2)]))],
        );
        let remote = lockfile(
            [("A", 3), ("B", 1)],
            vec![("brew:ripgrep", info("13.0.0", "A", [("A", 3), ("B", 1)]))],
        );
        let result = sync(&local, &remote, None);

        let summary = result.summary();
        assert_eq!(summary.relation, CausalRelation::Concurrent);
        assert_eq!(summary.total_conflicts, 1);
        assert_eq!(summary.auto_resolvable, 0);
        assert!(summary.needs_merge);

        let rows = result.rows();
        assert_eq!(rows[0].package, "brew:ripgrep");
        assert_eq!(rows[0].local_version.as_deref(), Some("14.1.0"));
        assert_eq!(rows[0].remote_version.as_deref(), Some("13.0.0"));
        assert!(!rows[0].resolvable);
    }

    #[test]
    fn test_merge_with_rejects_unknown_package() {
        let lock = Lockfile::new();
        let result = sync(&lock, &lock, None);
        let resolutions = BTreeMap::from([("brew:x".to_string(), Resolution::KeepLocal)]);
        assert!(matches!(
            result.merge_with(&resolutions),
            Err(Error::UnknownConflict(_))
        ));
    }
}
