//! `preflight snapshot`

use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use snapshot::{SnapshotSet, SnapshotStore};

use crate::Context;
use crate::cli::SnapshotCommand;
use crate::config::Settings;
use crate::engine::confirm_proceed;
use crate::ui;

pub fn run(ctx: &Context, cmd: &SnapshotCommand) -> Result<()> {
    let settings = Settings::load(ctx.config.as_deref())?;
    let store = SnapshotStore::new(settings.snapshot_path()?);

    match cmd {
        SnapshotCommand::List => list(&store),
        SnapshotCommand::Restore { id, yes } => restore(&store, id, *yes),
        SnapshotCommand::Prune { keep } => {
            let removed = store.prune(*keep)?;
            ui::success(&format!("Removed {removed} snapshot sets, kept {keep}"));
            Ok(())
        }
    }
}

fn list(store: &SnapshotStore) -> Result<()> {
    let sets = store.list()?;
    if sets.is_empty() {
        ui::info(&format!("No snapshots in {}", store.root().display()));
        return Ok(());
    }

    ui::header("Snapshots");
    for set in &sets {
        println!("  {}", describe(set));
    }
    Ok(())
}

fn restore(store: &SnapshotStore, id: &str, yes: bool) -> Result<()> {
    let set = store.load(id)?;

    ui::section(&format!("Snapshot {}", set.id));
    ui::kv("taken", &set.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string());
    ui::kv("reason", &set.reason);
    for file in &set.files {
        let state = match &file.link {
            Some(target) => format!("link to {}", target.display()),
            None if file.existed() => ui::format_size(file.size),
            None => "absent, will be deleted".to_string(),
        };
        ui::dim(&format!("{} ({})", file.path.display(), state));
    }

    if !yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let report = store.restore(&set.id)?;
    ui::success(&format!(
        "Restored {} files, removed {}",
        report.restored.len(),
        report.removed.len()
    ));
    Ok(())
}

/// One list line: id, local time, file count, size, reason
fn describe(set: &SnapshotSet) -> String {
    let size: u64 = set.files.iter().map(|f| f.size).sum();
    format!(
        "{}  {}  {:>3} files  {:>9}  {}",
        set.id.yellow(),
        set.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        set.len(),
        ui::format_size(size),
        set.reason.dimmed()
    )
}
