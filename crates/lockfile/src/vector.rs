//! Version vectors and causal ordering between lockfile states
//!
//! Each machine owns one counter in the vector and only ever increments
//! its own. Comparing two vectors entry-wise tells whether one state has
//! seen everything the other has (`Before`/`After`), both are identical
//! (`Equal`), or both advanced independently (`Concurrent`).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Causal relation of one version vector to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalRelation {
    /// Both vectors are identical
    Equal,
    /// The left vector is strictly behind the right one
    Before,
    /// The left vector is strictly ahead of the right one
    After,
    /// Neither vector dominates the other
    Concurrent,
}

impl CausalRelation {
    /// The relation seen from the other side
    pub fn inverse(self) -> Self {
        match self {
            Self::Before => Self::After,
            Self::After => Self::Before,
            other => other,
        }
    }

    /// Short label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Before => "behind",
            Self::After => "ahead",
            Self::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for CausalRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-machine monotonically increasing counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector(BTreeMap<String, u64>);

impl VersionVector {
    /// Create an empty vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for a machine (zero when the machine never wrote)
    pub fn get(&self, machine: &str) -> u64 {
        self.0.get(machine).copied().unwrap_or(0)
    }

    /// Advance this machine's own counter and return the new value
    pub fn increment(&mut self, machine: &str) -> u64 {
        let counter = self.0.entry(machine.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Entry-wise maximum of both vectors
    pub fn merged(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (machine, &count) in &other.0 {
            let entry = out.0.entry(machine.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        out
    }

    /// Machines with a counter in this vector
    pub fn machines(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|&c| c == 0)
    }

    /// Causal relation of `self` to `other`
    pub fn relation_to(&self, other: &Self) -> CausalRelation {
        classify(self, other)
    }
}

impl<const N: usize> From<[(&str, u64); N]> for VersionVector {
    fn from(entries: [(&str, u64); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(machine, count)| (machine.to_string(), count))
                .collect(),
        )
    }
}

impl fmt::Display for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (machine, count)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{machine}:{count}")?;
        }
        f.write_str("}")
    }
}

/// Classify `local` against `remote`.
///
/// Missing machines count as zero, so `{A:1}` and `{A:1, B:0}` are equal.
/// This is the single comparison used by both the conflict report and
/// the merge decision.
pub fn classify(local: &VersionVector, remote: &VersionVector) -> CausalRelation {
    let mut less = false;
    let mut greater = false;

    for machine in local.machines().chain(remote.machines()) {
        match local.get(machine).cmp(&remote.get(machine)) {
            Ordering::Less => less = true,
            Ordering::Greater => greater = true,
            Ordering::Equal => {}
        }
        if less && greater {
            return CausalRelation::Concurrent;
        }
    }

    match (less, greater) {
        (false, false) => CausalRelation::Equal,
        (true, false) => CausalRelation::Before,
        (false, true) => CausalRelation::After,
        (true, true) => CausalRelation::Concurrent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_scenarios() {
        let local = VersionVector::from([("A", 2), ("B", 1)]);
        let remote = VersionVector::from([("A", 2), ("B", 2)]);
        assert_eq!(classify(&local, &remote), CausalRelation::Before);

        let local = VersionVector::from([("A", 3), ("B", 1)]);
        let remote = VersionVector::from([("A", 2), ("B", 1)]);
        assert_eq!(classify(&local, &remote), CausalRelation::After);

        let local = VersionVector::from([("A", 2), ("B", 2)]);
        let remote = VersionVector::from([("A", 3), ("B", 1)]);
        assert_eq!(classify(&local, &remote), CausalRelation::Concurrent);
    }

    #[test]
    fn test_classify_reflexive_and_inverse() {
        let vectors = [
            VersionVector::new(),
            VersionVector::from([("A", 1)]),
            VersionVector::from([("A", 1), ("B", 3)]),
            VersionVector::from([("B", 2), ("C", 1)]),
            VersionVector::from([("A", 4), ("B", 3), ("C", 1)]),
        ];

        for a in &vectors {
            assert_eq!(classify(a, a), CausalRelation::Equal);
            for b in &vectors {
                assert_eq!(classify(a, b), classify(b, a).inverse());
            }
        }
    }

    #[test]
    fn test_missing_machine_counts_as_zero() {
        let a = VersionVector::from([("A", 1)]);
        let b = VersionVector::from([("A", 1), ("B", 0)]);
        assert_eq!(classify(&a, &b), CausalRelation::Equal);

        let c = VersionVector::from([("B", 1)]);
        assert_eq!(classify(&a, &c), CausalRelation::Concurrent);
    }

    #[test]
    fn test_increment_and_merge() {
        let mut a = VersionVector::new();
        assert_eq!(a.increment("laptop"), 1);
        assert_eq!(a.increment("laptop"), 2);

        let b = VersionVector::from([("laptop", 1), ("desktop", 5)]);
        let merged = a.merged(&b);
        assert_eq!(merged.get("laptop"), 2);
        assert_eq!(merged.get("desktop"), 5);
        assert_eq!(classify(&merged, &a), CausalRelation::After);
        assert_eq!(classify(&merged, &b), CausalRelation::After);
    }

    #[test]
    fn test_display() {
        let v = VersionVector::from([("b", 2), ("a", 1)]);
        assert_eq!(v.to_string(), "{a:1, b:2}");
    }
}
