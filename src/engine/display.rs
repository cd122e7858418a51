//! Terminal rendering of plans, diffs and apply results

use colored::{ColoredString, Colorize};
use declarative::{ApplyReport, Diff, DiffKind, Document, ExecutionPlan, PlanEntry};
use std::collections::BTreeMap;

/// Longest single-line value shown inline
const INLINE_WIDTH: usize = 60;

/// Print the plan grouped by provider. Satisfied entries only show when
/// `verbose`.
pub fn show_plan(plan: &ExecutionPlan, verbose: bool) {
    if plan.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        if verbose {
            for entry in plan.entries() {
                println!("    {} {}", "○".dimmed(), entry.step.description().dimmed());
            }
        }
        return;
    }

    let mut by_provider: BTreeMap<&str, Vec<&PlanEntry>> = BTreeMap::new();
    for entry in plan.entries() {
        if entry.needs_apply() || verbose {
            by_provider
                .entry(entry.step.provider())
                .or_default()
                .push(entry);
        }
    }

    println!();
    println!("┌─ {} ─────────────────────────────", "Plan".bold());
    for (provider, entries) in &by_provider {
        println!("│");
        println!("│ {}", provider.bold());
        for entry in entries {
            if !entry.needs_apply() {
                println!("│   {} {}", "○".dimmed(), entry.step.description().dimmed());
                continue;
            }
            println!("│   {} {}", entry_symbol(entry), entry.step.description());
            for diff in &entry.diffs {
                for line in diff_detail(diff) {
                    println!("│       {line}");
                }
            }
        }
    }
    println!("│");
    println!("└─────────────────────────────────────────");

    let summary = plan.summary();
    println!(
        "  Plan: {} to add, {} to change, {} to remove",
        summary.additions.to_string().green(),
        summary.changes.to_string().yellow(),
        summary.removals.to_string().red()
    );
}

/// Print every diff on its own line
pub fn show_diffs(plan: &ExecutionPlan) {
    let mut any = false;
    for (provider, diffs) in declarative::group_by_provider(plan.diffs()) {
        any = true;
        println!();
        println!("{}", provider.cyan().bold());
        for diff in diffs {
            println!("  {}", colorize(diff.kind, &diff.to_string()));
        }
    }
    if !any {
        println!("  {} No differences", "✓".green());
    }
}

/// Print the outcome of an apply
pub fn show_apply_summary(report: &ApplyReport) {
    let summary = report.summary();
    println!();
    if summary.is_success() && !report.cancelled {
        println!("  {} Configuration applied successfully!", "✓".green().bold());
    } else if report.rolled_back {
        println!("  {} Apply failed and was rolled back", "↺".yellow().bold());
    } else {
        println!("  {} Configuration applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} removed", summary.removed);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
        for failure in report.failures() {
            println!(
                "      {} {}: {}",
                "✗".red(),
                failure.step_id,
                failure.error.as_deref().unwrap_or_default()
            );
        }
    }
    let not_run = report.pending.saturating_sub(report.results.len());
    if not_run > 0 {
        println!("    • {} not run", not_run);
    }
    if let Some(id) = &report.snapshot {
        println!("    • snapshot {}", id.dimmed());
    }
}

fn entry_symbol(entry: &PlanEntry) -> ColoredString {
    let kinds: Vec<DiffKind> = entry.diffs.iter().map(|d| d.kind).collect();
    if kinds.iter().all(|k| *k == DiffKind::Add) {
        "+".green()
    } else if kinds.iter().all(|k| *k == DiffKind::Remove) {
        "-".red()
    } else {
        "~".yellow()
    }
}

fn colorize(kind: DiffKind, text: &str) -> ColoredString {
    match kind {
        DiffKind::Add => text.green(),
        DiffKind::Change => text.yellow(),
        DiffKind::Remove => text.red(),
    }
}

/// Detail lines for one diff. Multi-line text is shown as a line diff.
fn diff_detail(diff: &Diff) -> Vec<String> {
    let old = diff.source.as_ref().and_then(text_of);
    let new = diff.dest.as_ref().and_then(text_of);
    if old.is_some_and(is_multiline) || new.is_some_and(is_multiline) {
        return text_diff(old.unwrap_or_default(), new.unwrap_or_default());
    }

    let field = if diff.key.is_empty() {
        String::new()
    } else {
        format!("{}: ", diff.key)
    };
    let line = match diff.kind {
        DiffKind::Add => format!("{}{}", field, inline(diff.dest.as_ref())),
        DiffKind::Remove => format!("{}{}", field, inline(diff.source.as_ref())),
        DiffKind::Change => format!(
            "{}{} → {}",
            field,
            inline(diff.source.as_ref()),
            inline(diff.dest.as_ref())
        ),
    };
    vec![line.dimmed().to_string()]
}

/// File text carried by a diff value: a string, or a `{content}` mapping
fn text_of(doc: &Document) -> Option<&str> {
    doc.as_str()
        .or_else(|| doc.get("content").and_then(Document::as_str))
}

fn is_multiline(text: &str) -> bool {
    text.contains('\n')
}

fn inline(value: Option<&Document>) -> String {
    match value {
        None => "(absent)".to_string(),
        Some(doc) => {
            let form = doc.display_form();
            if form.chars().count() > INLINE_WIDTH {
                let head: String = form.chars().take(INLINE_WIDTH - 3).collect();
                format!("{head}...")
            } else {
                form
            }
        }
    }
}

/// Changed lines between two texts, `-`/`+` prefixed and colored
fn text_diff(old: &str, new: &str) -> Vec<String> {
    let diff = similar::TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .filter_map(|change| {
            let text = change.value().trim_end_matches('\n');
            match change.tag() {
                similar::ChangeTag::Delete => Some(format!("- {text}").red().to_string()),
                similar::ChangeTag::Insert => Some(format!("+ {text}").green().to_string()),
                similar::ChangeTag::Equal => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_diff_only_changed_lines() {
        colored::control::set_override(false);
        let lines = text_diff("a\nb\nc\n", "a\nB\nc\nd\n");
        assert_eq!(lines, vec!["- b", "+ B", "+ d"]);
    }

    #[test]
    fn test_file_content_uses_line_diff() {
        colored::control::set_override(false);
        let diff = Diff {
            kind: DiffKind::Change,
            provider: "files".into(),
            key: "/home/me/.zshrc.content".into(),
            source: Some("export A=1\nexport B=2\n".into()),
            dest: Some("export A=1\nexport B=3\n".into()),
        };
        assert_eq!(diff_detail(&diff), vec!["- export B=2", "+ export B=3"]);

        let new_file = Diff {
            kind: DiffKind::Add,
            provider: "files".into(),
            key: "/home/me/.vimrc".into(),
            source: None,
            dest: Some(Document::from_pairs([("content", Document::from("set nu\nsyntax on\n"))])),
        };
        assert_eq!(diff_detail(&new_file), vec!["+ set nu", "+ syntax on"]);
    }

    #[test]
    fn test_scalar_change_is_inline() {
        colored::control::set_override(false);
        let diff = Diff {
            kind: DiffKind::Change,
            provider: "brew".into(),
            key: "ripgrep.version".into(),
            source: Some("13.0.0".into()),
            dest: Some("14.1.0".into()),
        };
        assert_eq!(diff_detail(&diff), vec!["ripgrep.version: 13.0.0 → 14.1.0"]);
    }

    #[test]
    fn test_inline_truncates_long_values() {
        let long = Document::from("x".repeat(100));
        let shown = inline(Some(&long));
        assert_eq!(shown.chars().count(), INLINE_WIDTH);
        assert!(shown.ends_with("..."));
        assert_eq!(inline(None), "(absent)");
    }
}
