//! Plan builder: compiled steps diffed against observed state

use crate::context::StateCollector;
use crate::diff::{Diff, DiffSummary, Differ};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::step::SharedStep;
use crate::types::{PlanOptions, Status};
use lockfile::LockChange;

/// One step, whether it needs to run, and why
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub step: SharedStep,
    pub status: Status,
    pub diffs: Vec<Diff>,
}

impl PlanEntry {
    pub fn needs_apply(&self) -> bool {
        self.status == Status::NeedsApply
    }
}

/// Entries in apply order
///
/// Entries are only ever appended; the executor overwrites statuses as it
/// goes.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    entries: Vec<PlanEntry>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: PlanEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub(crate) fn set_status(&mut self, index: usize, status: Status) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.status = status;
        }
    }

    /// Entries that still need to run
    pub fn pending(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.needs_apply())
    }

    /// Number of entries, satisfied ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing needs to run
    pub fn is_empty(&self) -> bool {
        self.pending().next().is_none()
    }

    /// Every diff in the plan, in apply order
    pub fn diffs(&self) -> impl Iterator<Item = &Diff> {
        self.entries.iter().flat_map(|e| e.diffs.iter())
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(self.diffs())
    }

    /// Filter plan to only include entries matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&PlanEntry) -> bool,
    {
        Self {
            entries: self.entries.into_iter().filter(|e| predicate(e)).collect(),
        }
    }

    /// Filter plan to only include entries matching a target pattern
    ///
    /// Target format: "provider" or "provider.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (provider, name) = parse_target(t);
                self.filter(|e| matches_filter(e, provider, name))
            }
        }
    }

    /// Lockfile changes for every satisfied package entry
    pub fn lock_changes(&self, collector: &dyn StateCollector) -> Result<Vec<LockChange>> {
        let mut changes = Vec::new();
        for entry in self.entries.iter().filter(|e| e.status == Status::Satisfied) {
            let change = entry
                .step
                .lock_change(collector)
                .map_err(|source| Error::Observe {
                    step: entry.step.id(),
                    source,
                })?;
            changes.extend(change);
        }
        Ok(changes)
    }
}

/// Parse a target like "provider.name". Only the first dot splits, so
/// file paths and dotted config keys survive.
fn parse_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('.') {
        Some((provider, name)) if !name.is_empty() => (provider, Some(name)),
        Some((provider, _)) => (provider, None),
        None => (target, None),
    }
}

fn matches_filter(entry: &PlanEntry, provider: &str, name: Option<&str>) -> bool {
    if entry.step.provider() != provider {
        return false;
    }
    match name {
        Some(n) => entry.step.resource().contains(n),
        None => true,
    }
}

/// Runs the differ for each step against what the collector observes
pub struct Planner<'a> {
    collector: &'a dyn StateCollector,
    differ: Differ,
}

impl<'a> Planner<'a> {
    pub fn new(collector: &'a dyn StateCollector) -> Self {
        Self {
            collector,
            differ: Differ::new(),
        }
    }

    /// Use a differ restricted to some providers
    pub fn with_differ(mut self, differ: Differ) -> Self {
        self.differ = differ;
        self
    }

    /// Apply the provider allow-list from plan options
    pub fn with_options(self, options: &PlanOptions) -> Self {
        match &options.providers {
            Some(providers) => self.with_differ(Differ::with_providers(providers.iter().cloned())),
            None => self,
        }
    }

    /// Build a plan. Only reads state, so it can run any number of times.
    pub fn plan(&self, steps: &[SharedStep]) -> Result<ExecutionPlan> {
        let mut plan = ExecutionPlan::new();

        for step in steps {
            if !self.differ.allows(step.provider()) {
                log::debug!("{}: skipped, provider not selected", step.id());
                plan.push(PlanEntry {
                    step: step.clone(),
                    status: Status::Skipped,
                    diffs: Vec::new(),
                });
                continue;
            }

            let observed = step
                .observe(self.collector)
                .map_err(|source| Error::Observe {
                    step: step.id(),
                    source,
                })?;

            let diffs = self.differ.compare(
                &wrap(step.provider(), &step.resource(), observed),
                &wrap(step.provider(), &step.resource(), step.desired()),
            );
            let status = if diffs.is_empty() {
                Status::Satisfied
            } else {
                Status::NeedsApply
            };
            log::debug!("{}: {} ({} diffs)", step.id(), status, diffs.len());

            plan.push(PlanEntry {
                step: step.clone(),
                status,
                diffs,
            });
        }

        Ok(plan)
    }
}

/// `{provider: {resource: value}}`, with an absent value leaving the
/// provider mapping empty
fn wrap(provider: &str, resource: &str, value: Option<Document>) -> Document {
    let mut inner = Document::mapping();
    if let Some(value) = value {
        inner.insert(resource, value);
    }
    Document::from_pairs([(provider, inner)])
}
