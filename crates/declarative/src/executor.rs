//! Execution engine - applies plan entries in order with snapshot safety
//!
//! Steps run one at a time: step N+1 never starts before step N's result is
//! recorded. Every file a step touches is captured into the apply's snapshot
//! session first, so a failed apply can be put back exactly as it was.

use crate::context::{ApplyContext, Backend, CancelToken, ProgressCallback};
use crate::error::{Error, Result};
use crate::planner::ExecutionPlan;
use crate::types::{ApplyOptions, ApplySummary, Status, StepResult};
use snapshot::{Session, SnapshotStore};

/// What an apply did
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// One result per step that ran, in order
    pub results: Vec<StepResult>,
    /// Snapshot set written for this apply, if anything was captured
    pub snapshot: Option<String>,
    /// Set when a failure triggered a restore
    pub rolled_back: bool,
    /// Apply stopped at a failure without running the remaining steps
    pub halted: bool,
    /// Apply stopped on a cancellation request
    pub cancelled: bool,
    /// Steps that were pending when the apply started
    pub pending: usize,
}

impl ApplyReport {
    pub fn summary(&self) -> ApplySummary {
        ApplySummary::from_results(&self.results)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Turn failure, rollback and cancellation into an error
    pub fn into_result(self) -> Result<Self> {
        let failed = self.failures().count();
        if self.rolled_back
            && let Some(first) = self.failures().next()
        {
            return Err(Error::RolledBack {
                step: first.step_id.clone(),
                snapshot: self.snapshot.clone().unwrap_or_default(),
                cause: first.error.clone().unwrap_or_default(),
            });
        }
        if failed > 0 {
            return Err(Error::StepsFailed {
                failed,
                total: self.pending,
            });
        }
        if self.cancelled {
            return Err(Error::Cancelled {
                completed: self.results.len(),
                total: self.pending,
            });
        }
        Ok(self)
    }
}

/// Walks a plan and applies every entry that needs it
pub struct Executor<'a> {
    backend: &'a dyn Backend,
    store: Option<&'a SnapshotStore>,
    options: ApplyOptions,
    cancel: CancelToken,
}

impl<'a> Executor<'a> {
    pub fn new(backend: &'a dyn Backend, options: ApplyOptions) -> Self {
        Self {
            backend,
            store: None,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Capture touched files into this store before changing them
    pub fn with_snapshots(mut self, store: &'a SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply the plan, updating entry statuses in place.
    ///
    /// Step failures are recorded in the report, not returned; use
    /// [`ApplyReport::into_result`] to turn them into an error. An `Err`
    /// here means the snapshot store itself failed, or a rollback did.
    pub fn apply(
        &self,
        plan: &mut ExecutionPlan,
        progress: &mut dyn ProgressCallback,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport {
            pending: plan.pending().count(),
            ..ApplyReport::default()
        };
        if report.pending == 0 {
            return Ok(report);
        }

        let mut session = self.store.map(|s| s.begin(self.options.reason.clone()));
        let mut ctx = ApplyContext::new(self.backend, self.options.verbose);
        progress.on_apply_start(report.pending);

        for index in 0..plan.len() {
            let step = {
                let entry = &plan.entries()[index];
                if !entry.needs_apply() {
                    continue;
                }
                entry.step.clone()
            };

            if self.cancel.is_cancelled() {
                log::info!("Apply cancelled before {}", step.id());
                report.cancelled = true;
                break;
            }

            progress.on_step_start(&step.id(), &step.description());

            let outcome = capture(session.as_mut(), &step.touches())
                .and_then(|()| step.apply(&mut ctx));
            let result = match outcome {
                Ok(outcome) => StepResult::succeeded(step.id(), outcome),
                Err(e) => {
                    log::warn!("{} failed: {:#}", step.id(), e);
                    StepResult::failed(step.id(), format!("{e:#}"))
                }
            };

            plan.set_status(index, result.status);
            progress.on_step_complete(&result);
            let failed = result.is_failure();
            report.results.push(result);

            if failed && self.options.rollback_on_failure {
                report.halted = true;
                break;
            }
        }

        if let Some(session) = session
            && !session.is_empty()
        {
            let set = session.commit()?;
            report.snapshot = Some(set.id.clone());

            if report.halted {
                self.rollback(plan, &report, &set.id)?;
                report.rolled_back = true;
                progress.on_rollback(&set.id);
            }
        }

        progress.on_apply_complete();
        Ok(report)
    }

    fn rollback(&self, plan: &mut ExecutionPlan, report: &ApplyReport, id: &str) -> Result<()> {
        let Some(store) = self.store else {
            return Ok(());
        };
        let failure = report.failures().next();
        let step = failure.map(|f| f.step_id.clone()).unwrap_or_default();
        let cause = failure.and_then(|f| f.error.clone()).unwrap_or_default();

        let restored = store.restore(id).map_err(|source| Error::RollbackFailed {
            step: step.clone(),
            cause,
            source,
        })?;
        log::info!("Rolled back {} after {} failed", id, step);

        // Entries whose files were put back have to run again
        let paths: Vec<_> = restored.paths().cloned().collect();
        let reverted: Vec<usize> = plan
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == Status::Satisfied)
            .filter(|(_, e)| e.step.touches().iter().any(|p| paths.contains(p)))
            .map(|(i, _)| i)
            .collect();
        for index in reverted {
            plan.set_status(index, Status::NeedsApply);
        }
        Ok(())
    }
}

fn capture(session: Option<&mut Session<'_>>, paths: &[std::path::PathBuf]) -> anyhow::Result<()> {
    if let Some(session) = session {
        for path in paths {
            session.capture(path)?;
        }
    }
    Ok(())
}
