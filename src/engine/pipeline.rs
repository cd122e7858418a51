//! Load, compile, plan, apply, record

use anyhow::{Context as _, Result};
use colored::Colorize;
use declarative::{
    ApplyOptions, Compiler, Document, ExecutionPlan, Executor, Phase, PlanOptions, Planner,
    ProviderSet, ReproducibilityMode, SharedStep,
};
use lockfile::{Drift, Lockfile};
use snapshot::SnapshotStore;
use std::path::PathBuf;

use crate::Context;
use crate::backend::ShellBackend;
use crate::cli::{ApplyArgs, PlanArgs};
use crate::config::Settings;
use crate::layers;
use crate::progress::ApplyProgress;
use crate::ui;

use super::display;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No desired-state layers (set `layers` in {} or pass --layer)", .settings.display())]
    NoLayers { settings: PathBuf },

    /// The machine changed but the lockfile does not say so
    #[error("Changes were applied but lockfile {} could not be updated", .path.display())]
    LockfileAfterApply {
        path: PathBuf,
        #[source]
        source: lockfile::Error,
    },
}

/// Everything loaded before compiling
pub struct Workspace {
    pub settings: Settings,
    pub backend: ShellBackend,
    pub desired: Document,
    pub lockfile: Lockfile,
    pub lock_path: PathBuf,
}

impl Workspace {
    pub fn load(ctx: &Context, args: &PlanArgs) -> Result<Self> {
        let settings = Settings::load(ctx.config.as_deref())?;

        let layer_paths = if args.layers.is_empty() {
            settings.layer_paths()
        } else {
            args.layers.clone()
        };
        if layer_paths.is_empty() {
            let settings = match &ctx.config {
                Some(p) => p.clone(),
                None => Settings::default_path()?,
            };
            return Err(PipelineError::NoLayers { settings }.into());
        }
        let desired = layers::load(&layer_paths)?;

        let lock_path = settings.lockfile_path()?;
        let lockfile = Lockfile::load_or_default(&lock_path)
            .with_context(|| format!("Could not load lockfile {}", lock_path.display()))?;
        let backend = ShellBackend::new(settings.providers.clone());

        Ok(Self {
            settings,
            backend,
            desired,
            lockfile,
            lock_path,
        })
    }

    /// Mode from the flag, else from settings
    pub fn mode(&self, args: &PlanArgs) -> ReproducibilityMode {
        args.mode.unwrap_or(self.settings.mode)
    }

    pub fn compile(&self, mode: ReproducibilityMode) -> Result<Vec<SharedStep>> {
        let providers = ProviderSet::new(self.backend.provider_names());
        let steps = Compiler::new(&providers, &self.backend, mode)
            .with_lockfile(&self.lockfile)
            .compile(&self.desired)?;
        Ok(steps)
    }

    /// Compile and plan, restricted by the target and provider flags
    pub fn plan(&self, args: &PlanArgs) -> Result<ExecutionPlan> {
        let options = PlanOptions {
            mode: self.mode(args),
            target: args.target.clone(),
            providers: args.only.clone(),
        };
        let steps = self.compile(options.mode)?;
        let plan = Planner::new(&self.backend)
            .with_options(&options)
            .plan(&steps)?
            .filter_by_target(options.target.as_deref());
        log::info!(
            "Planned {} steps, {} pending ({} mode)",
            plan.len(),
            plan.pending().count(),
            options.mode
        );
        Ok(plan)
    }

    /// Record satisfied packages in the lockfile and save it if anything changed
    fn record(&mut self, plan: &ExecutionPlan) -> Result<usize> {
        let changes = plan.lock_changes(&self.backend)?;
        let machine_id = self.settings.machine_id();
        let changed = self.lockfile.record(&machine_id, changes);
        if changed > 0 {
            self.lockfile
                .save(&self.lock_path)
                .map_err(|source| PipelineError::LockfileAfterApply {
                    path: self.lock_path.clone(),
                    source,
                })?;
            log::info!("Recorded {} lockfile entries as {}", changed, machine_id);
        }
        Ok(changed)
    }
}

/// Packages whose lock entry is missing or disagrees with the desired version.
///
/// Frozen verification lists every drift instead of stopping at the first,
/// so it compiles in intent mode (pins, else upstream) and compares after.
pub fn verify_lock(workspace: &Workspace, mode: ReproducibilityMode) -> Result<Vec<Drift>> {
    let compile_mode = match mode {
        ReproducibilityMode::Frozen => ReproducibilityMode::Intent,
        other => other,
    };
    let steps = workspace.compile(compile_mode)?;
    let resolved: Vec<(String, Option<String>)> = steps
        .iter()
        .filter(|step| step.phase() == Phase::Install)
        .filter_map(|step| {
            let desired = step.desired()?;
            let version = desired.get("version").and_then(Document::scalar_text);
            Some((format!("{}:{}", step.provider(), step.resource()), version))
        })
        .collect();

    Ok(workspace
        .lockfile
        .verify_against(resolved.iter().map(|(k, v)| (k.as_str(), v.as_deref()))))
}

/// `preflight apply`
pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let mut workspace = Workspace::load(ctx, &args.plan)?;
    let mut plan = workspace.plan(&args.plan)?;

    if !ctx.quiet {
        display::show_plan(&plan, ctx.verbose > 0);
    }

    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }

    if plan.is_empty() {
        let recorded = workspace.record(&plan)?;
        if recorded > 0 && !ctx.quiet {
            ui::dim(&format!("Locked {recorded} packages"));
        }
        return Ok(());
    }

    if !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let store = SnapshotStore::new(workspace.settings.snapshot_path()?);
    let options = ApplyOptions {
        rollback_on_failure: args
            .rollback_override()
            .unwrap_or(workspace.settings.rollback_on_failure),
        reason: format!("preflight apply ({})", workspace.mode(&args.plan)),
        verbose: ctx.verbose > 0,
    };
    let mut progress = ApplyProgress::new(ctx.quiet, ctx.verbose > 0);

    let report = Executor::new(&workspace.backend, options)
        .with_snapshots(&store)
        .apply(&mut plan, &mut progress)?;

    if !ctx.quiet {
        display::show_apply_summary(&report);
    }

    if report.failures().next().is_none() && !report.cancelled {
        let recorded = workspace.record(&plan)?;
        if recorded > 0 && !ctx.quiet {
            ui::dim(&format!("Locked {recorded} packages"));
        }
    }

    report.into_result()?;
    Ok(())
}

/// Confirm with user
pub fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
