//! `preflight lock`

use anyhow::Result;
use colored::Colorize;
use declarative::ReproducibilityMode;
use lockfile::{Drift, Lockfile};

use crate::Context;
use crate::cli::{LockCommand, PlanArgs};
use crate::config::Settings;
use crate::engine::{Workspace, verify_lock};
use crate::ui;

pub fn run(ctx: &Context, cmd: &LockCommand) -> Result<()> {
    match cmd {
        LockCommand::Show => show(ctx),
        LockCommand::Verify(args) => verify(ctx, args),
    }
}

fn show(ctx: &Context) -> Result<()> {
    let settings = Settings::load(ctx.config.as_deref())?;
    let path = settings.lockfile_path()?;
    let Some(lock) = Lockfile::load(&path)? else {
        ui::info(&format!("No lockfile at {}", path.display()));
        return Ok(());
    };

    ui::header("Lockfile");
    ui::kv("path", &path.display().to_string());
    ui::kv("vector", &lock.vector.to_string());
    ui::kv("packages", &lock.len().to_string());

    if lock.is_empty() {
        return Ok(());
    }
    let width = lock.packages.keys().map(String::len).max().unwrap_or(0);
    println!();
    for (key, info) in &lock.packages {
        println!(
            "  {:<width$}  {}  {}",
            key,
            info.version.green(),
            format!(
                "{} {}",
                info.provenance.machine_id, info.provenance.version_vector
            )
            .dimmed(),
        );
    }
    Ok(())
}

fn verify(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let workspace = Workspace::load(ctx, args)?;
    let mode = args.mode.unwrap_or(ReproducibilityMode::Locked);
    let drift = verify_lock(&workspace, mode)?;

    if drift.is_empty() {
        ui::success(&format!(
            "Lockfile matches the desired state ({} packages locked)",
            workspace.lockfile.len()
        ));
        return Ok(());
    }

    ui::section("Drift");
    for d in &drift {
        println!("  {} {}", "✗".red(), describe(d));
    }
    anyhow::bail!(
        "{} packages differ from {}",
        drift.len(),
        workspace.lock_path.display()
    )
}

fn describe(drift: &Drift) -> String {
    match (&drift.locked, &drift.resolved) {
        (None, Some(v)) => format!("{}: not locked (wants {})", drift.key, v),
        (None, None) => format!("{}: not locked", drift.key),
        (Some(l), Some(v)) => format!("{}: locked {}, wants {}", drift.key, l, v),
        (Some(l), None) => format!("{}: locked {}", drift.key, l),
    }
}
