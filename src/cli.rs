use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use declarative::ReproducibilityMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "preflight")]
#[command(version)]
#[command(about = "Declarative machine configuration with plan, apply and rollback", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: <config dir>/config.toml)
    #[arg(short, long, global = true, env = "PREFLIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Apply the plan
    Apply(ApplyArgs),

    /// Show raw diffs between the machine and the desired state
    Diff(PlanArgs),

    /// Inspect the lockfile
    #[command(subcommand)]
    Lock(LockCommand),

    /// Compare the local lockfile with another machine's
    Conflicts(ConflictsArgs),

    /// Manage apply snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Clone, Default)]
pub struct PlanArgs {
    /// Only include `provider` or `provider.name`
    #[arg(short, long)]
    pub target: Option<String>,

    /// Version resolution mode (intent, locked, frozen)
    #[arg(short, long)]
    pub mode: Option<ReproducibilityMode>,

    /// Only diff these providers (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Option<Vec<String>>,

    /// Desired-state layers, replacing the configured ones
    #[arg(short, long = "layer")]
    pub layers: Vec<PathBuf>,
}

#[derive(Args, Clone, Default)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Show the plan and stop
    #[arg(short, long)]
    pub dry_run: bool,

    /// Roll back file changes on the first failure
    #[arg(long, overrides_with = "no_rollback")]
    pub rollback: bool,

    /// Keep going after failures
    #[arg(long)]
    pub no_rollback: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl ApplyArgs {
    /// Rollback choice from the flags, `None` when neither was given
    pub fn rollback_override(&self) -> Option<bool> {
        match (self.rollback, self.no_rollback) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
pub enum LockCommand {
    /// Print the locked packages with their provenance
    Show,

    /// Check that every desired package is locked at the version it resolves to
    Verify(PlanArgs),
}

#[derive(Args)]
pub struct ConflictsArgs {
    /// The other machine's lockfile
    pub remote: PathBuf,

    /// Common ancestor lockfile, enables automatic resolution
    #[arg(short, long)]
    pub base: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Resolve every manual conflict to one side
    #[arg(long, value_enum)]
    pub prefer: Option<Side>,

    /// Save the merged lockfile when nothing is left unresolved
    #[arg(short, long)]
    pub write: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Side {
    Local,
    Remote,
}

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// List snapshot sets, newest first
    List,

    /// Put files back as they were in a snapshot set
    Restore {
        /// Snapshot set ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete all but the newest snapshot sets
    Prune {
        /// Number of sets to keep
        #[arg(short, long, default_value = "10")]
        keep: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from([
            "preflight",
            "apply",
            "--dry-run",
            "--mode",
            "frozen",
            "--target",
            "brew.ripgrep",
            "--only",
            "brew,git",
        ]);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.dry_run);
        assert_eq!(args.plan.mode, Some(ReproducibilityMode::Frozen));
        assert_eq!(args.plan.target.as_deref(), Some("brew.ripgrep"));
        assert_eq!(
            args.plan.only,
            Some(vec!["brew".to_string(), "git".to_string()])
        );
        assert_eq!(args.rollback_override(), None);
    }

    #[test]
    fn test_rollback_flags() {
        let parse = |flag: &str| {
            let cli = Cli::parse_from(["preflight", "apply", flag]);
            match cli.command {
                Command::Apply(args) => args.rollback_override(),
                _ => panic!("expected apply"),
            }
        };
        assert_eq!(parse("--rollback"), Some(true));
        assert_eq!(parse("--no-rollback"), Some(false));
    }

    #[test]
    fn test_bad_mode_is_rejected() {
        assert!(Cli::try_parse_from(["preflight", "plan", "--mode", "sometimes"]).is_err());
    }

    #[test]
    fn test_conflicts_args() {
        let cli = Cli::parse_from([
            "preflight",
            "conflicts",
            "remote.lock",
            "--base",
            "base.lock",
            "--prefer",
            "remote",
            "--json",
        ]);
        let Command::Conflicts(args) = cli.command else {
            panic!("expected conflicts");
        };
        assert_eq!(args.remote, PathBuf::from("remote.lock"));
        assert_eq!(args.base, Some(PathBuf::from("base.lock")));
        assert!(args.prefer == Some(Side::Remote));
        assert!(args.json && !args.write);
    }
}
