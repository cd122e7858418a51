//! Core types for planning and applying steps

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a plan entry stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Observed state already matches desired state
    Satisfied,
    /// The step has to run
    NeedsApply,
    /// The step ran and failed
    Failed,
    /// Provider is outside the plan's allow-list; never observed
    Skipped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Satisfied => "satisfied",
            Self::NeedsApply => "needs apply",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// What a successful step apply did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// Nothing needed changing after all
    NoChange,
    /// Resource was created or installed
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
}

impl ApplyResult {
    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }
}

/// Outcome of running one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step_id: String,
    /// `Satisfied` or `Failed`
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ApplyResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn succeeded(step_id: impl Into<String>, outcome: ApplyResult) -> Self {
        Self {
            step_id: step_id.into(),
            status: Status::Satisfied,
            outcome: Some(outcome),
            error: None,
        }
    }

    pub fn failed(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: Status::Failed,
            outcome: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == Status::Failed
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub no_change: usize,
    pub failed: usize,
}

impl ApplySummary {
    /// Build a summary from step results
    pub fn from_results(results: &[StepResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of steps that ran
    pub fn total(&self) -> usize {
        self.total_changes() + self.no_change + self.failed
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ApplySummary) {
        self.created += other.created;
        self.modified += other.modified;
        self.removed += other.removed;
        self.no_change += other.no_change;
        self.failed += other.failed;
    }

    pub fn add_result(&mut self, result: &StepResult) {
        match (&result.status, &result.outcome) {
            (Status::Failed, _) => self.failed += 1,
            (_, Some(ApplyResult::Created)) => self.created += 1,
            (_, Some(ApplyResult::Modified)) => self.modified += 1,
            (_, Some(ApplyResult::Removed)) => self.removed += 1,
            _ => self.no_change += 1,
        }
    }
}

/// How package versions are resolved against the lockfile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReproducibilityMode {
    /// Unpinned packages float to the latest version
    #[default]
    Intent,
    /// Prefer the locked version, declared pins still win
    Locked,
    /// Resolution must match the lockfile exactly
    Frozen,
}

impl ReproducibilityMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Locked => "locked",
            Self::Frozen => "frozen",
        }
    }
}

impl fmt::Display for ReproducibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReproducibilityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intent" => Ok(Self::Intent),
            "locked" => Ok(Self::Locked),
            "frozen" => Ok(Self::Frozen),
            other => Err(format!(
                "unknown mode '{other}' (expected intent, locked or frozen)"
            )),
        }
    }
}

/// Options fixed for one compile and plan
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub mode: ReproducibilityMode,
    /// Restrict the plan to `provider` or `provider.name`
    pub target: Option<String>,
    /// Only diff these providers; everything else is skipped unobserved
    pub providers: Option<Vec<String>>,
}

/// Options fixed for one apply
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Restore the snapshot set and stop at the first failure
    pub rollback_on_failure: bool,
    /// Recorded on the snapshot set
    pub reason: String,
    pub verbose: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            rollback_on_failure: false,
            reason: "preflight apply".to_string(),
            verbose: false,
        }
    }
}
