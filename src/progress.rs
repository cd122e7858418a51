//! Apply progress on the terminal

use colored::Colorize;
use declarative::{ApplyResult, ProgressCallback, StepResult};
use indicatif::{ProgressBar, ProgressStyle};

use crate::ui;

/// Progress bar over the pending steps of one apply
pub struct ApplyProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
    verbose: bool,
}

impl ApplyProgress {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self {
            bar: None,
            quiet,
            verbose,
        }
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) => bar.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_apply_start(&mut self, pending: usize) {
        let bar = if self.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(pending as u64)
        };
        // The template is a literal; an error here only loses styling
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        self.bar = Some(bar);
    }

    fn on_step_start(&mut self, id: &str, description: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(ui::truncate_path(id, 40));
        }
        if self.verbose && !self.quiet {
            self.println(format!("  {} {}", "→".cyan(), description));
        }
    }

    fn on_step_complete(&mut self, result: &StepResult) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        if self.quiet {
            return;
        }
        let symbol = match (&result.outcome, &result.error) {
            (_, Some(_)) => "✗".red(),
            (Some(ApplyResult::NoChange), _) => "○".dimmed(),
            _ => "✓".green(),
        };
        match &result.error {
            Some(error) => self.println(format!("  {} {} ({})", symbol, result.step_id, error)),
            None if self.verbose => self.println(format!("  {} {}", symbol, result.step_id)),
            None => {}
        }
    }

    fn on_rollback(&mut self, snapshot_id: &str) {
        if !self.quiet {
            self.println(format!(
                "  {} Restored files from snapshot {}",
                "↺".yellow(),
                snapshot_id
            ));
        }
    }

    fn on_apply_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
