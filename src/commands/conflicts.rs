//! `preflight conflicts`: compare the local lockfile with another machine's

use anyhow::{Context as _, Result};
use colored::Colorize;
use lockfile::{ConflictRow, Lockfile, Resolution, SyncOutcome, SyncResult, SyncSummary};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::Context;
use crate::cli::{ConflictsArgs, Side};
use crate::config::Settings;
use crate::ui;

/// Machine-readable report
#[derive(Debug, Serialize)]
struct Report {
    outcome: SyncOutcome,
    summary: SyncSummary,
    conflicts: Vec<ConflictRow>,
}

impl Report {
    fn from_result(result: &SyncResult) -> Self {
        Self {
            outcome: result.outcome(),
            summary: result.summary(),
            conflicts: result.rows(),
        }
    }
}

pub fn run(ctx: &Context, args: &ConflictsArgs) -> Result<()> {
    let settings = Settings::load(ctx.config.as_deref())?;
    let local_path = settings.lockfile_path()?;
    let local = Lockfile::load_or_default(&local_path)
        .with_context(|| format!("Could not load lockfile {}", local_path.display()))?;
    let remote = load_required(&args.remote)?;
    let base = args.base.as_deref().map(load_required).transpose()?;

    let result = lockfile::sync(&local, &remote, base.as_ref());
    let report = Report::from_result(&result);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !ctx.quiet {
        print_report(&report);
    }

    if args.write {
        let resolutions = args
            .prefer
            .map(|side| prefer_all(&result, side))
            .unwrap_or_default();
        let merged = result.merge_with(&resolutions)?;
        merged
            .save(&local_path)
            .with_context(|| format!("Could not write {}", local_path.display()))?;
        if !args.json {
            ui::success(&format!(
                "Merged {} packages into {}",
                merged.len(),
                local_path.display()
            ));
        }
    } else if result.has_manual_conflicts() && !args.json {
        ui::warn("Manual conflicts remain; resolve with --prefer local|remote --write");
    }
    Ok(())
}

fn load_required(path: &Path) -> Result<Lockfile> {
    Lockfile::load(path)?.with_context(|| format!("Lockfile not found: {}", path.display()))
}

/// Resolve every manual conflict to `side`
fn prefer_all(result: &SyncResult, side: Side) -> BTreeMap<String, Resolution> {
    let resolution = match side {
        Side::Local => Resolution::KeepLocal,
        Side::Remote => Resolution::TakeRemote,
    };
    result
        .manual_conflicts()
        .map(|c| (c.package.clone(), resolution))
        .collect()
}

fn print_report(report: &Report) {
    let summary = &report.summary;
    ui::header("Lockfile sync");
    ui::kv("relation", &summary.relation.to_string());
    ui::kv("outcome", &outcome_label(report.outcome));

    if report.conflicts.is_empty() {
        println!();
        println!("  {} No conflicts", "✓".green());
        return;
    }

    let width = report
        .conflicts
        .iter()
        .map(|c| c.package.len())
        .max()
        .unwrap_or(0)
        .max("package".len());
    println!();
    println!(
        "  {:<width$}  {:<16}  {:<12}  {:<12}  {}",
        "package".bold(),
        "type".bold(),
        "local".bold(),
        "remote".bold(),
        "resolvable".bold(),
    );
    for row in &report.conflicts {
        let resolvable = if row.resolvable {
            "yes".green()
        } else {
            "no".red()
        };
        println!(
            "  {:<width$}  {:<16}  {:<12}  {:<12}  {}",
            row.package,
            row.kind.label(),
            row.local_version.as_deref().unwrap_or("-"),
            row.remote_version.as_deref().unwrap_or("-"),
            resolvable,
        );
    }

    println!();
    println!(
        "  {} conflicts, {} auto-resolvable{}",
        summary.total_conflicts,
        summary.auto_resolvable,
        if summary.needs_merge {
            ", merge needed"
        } else {
            ""
        }
    );
}

fn outcome_label(outcome: SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Synced => "in sync".green().to_string(),
        SyncOutcome::Pull => "remote is ahead, pull".cyan().to_string(),
        SyncOutcome::Push => "local is ahead, push".cyan().to_string(),
        SyncOutcome::Merge => "both changed, merge".yellow().to_string(),
        SyncOutcome::Blocked => "manual conflicts".red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockfile::{CausalRelation, ConflictKind, LockChange};

    fn lock(machine: &str, entries: &[(&str, &str)]) -> Lockfile {
        let mut lock = Lockfile::new();
        lock.record(
            machine,
            entries.iter().map(|(k, v)| LockChange::Upsert {
                key: (*k).to_string(),
                version: (*v).to_string(),
            }),
        );
        lock
    }

    #[test]
    fn test_report_json_shape() {
        let local = lock("laptop", &[("brew:ripgrep", "14.1.0")]);
        let remote = lock("desktop", &[("brew:ripgrep", "13.0.0")]);
        let result = lockfile::sync(&local, &remote, None);

        let json = serde_json::to_value(Report::from_result(&result)).unwrap();
        assert_eq!(json["outcome"], "blocked");
        assert_eq!(json["summary"]["total_conflicts"], 1);
        assert_eq!(json["summary"]["needs_merge"], true);
        let row = &json["conflicts"][0];
        assert_eq!(row["package"], "brew:ripgrep");
        assert_eq!(row["type"], "both_modified");
        assert_eq!(row["local_version"], "14.1.0");
        assert_eq!(row["remote_version"], "13.0.0");
        assert_eq!(row["resolvable"], false);
    }

    #[test]
    fn test_prefer_all_resolves_every_manual_conflict() {
        let local = lock("laptop", &[("brew:ripgrep", "14.1.0"), ("brew:fd", "9.0.0")]);
        let remote = lock("desktop", &[("brew:ripgrep", "13.0.0"), ("brew:fd", "8.0.0")]);
        let result = lockfile::sync(&local, &remote, None);
        assert_eq!(result.relation, CausalRelation::Concurrent);
        assert!(result.conflicts.iter().all(|c| c.kind == ConflictKind::BothModified));

        let resolutions = prefer_all(&result, Side::Remote);
        assert_eq!(resolutions.len(), 2);
        let merged = result.merge_with(&resolutions).unwrap();
        assert_eq!(merged.version_of("brew:ripgrep"), Some("13.0.0"));
        assert_eq!(merged.version_of("brew:fd"), Some("8.0.0"));
        assert!(result.merge().is_err());
    }
}
