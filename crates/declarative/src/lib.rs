//! # Declarative
//!
//! The reconciliation engine: turn a layered desired-state document into
//! ordered steps, diff them against the machine, and apply what differs.
//!
//! ## Core Concepts
//!
//! - **Document**: desired and observed state as a Scalar/Sequence/Mapping tree
//! - **Differ**: typed Add/Change/Remove diffs between two documents
//! - **Step**: an idempotent unit of change (package, file, config key)
//! - **Compiler**: document to ordered steps, under a reproducibility mode
//! - **ExecutionPlan**: steps paired with a status and their diffs
//! - **Executor**: applies a plan in order, with snapshot rollback
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     ApplyOptions, Compiler, Executor, NoProgress, Planner, ProviderSet,
//!     ReproducibilityMode,
//! };
//!
//! let providers = ProviderSet::new(["brew"]);
//! let steps = Compiler::new(&providers, &resolver, ReproducibilityMode::Locked)
//!     .with_lockfile(&lock)
//!     .compile(&desired)?;
//!
//! let mut plan = Planner::new(&collector).plan(&steps)?;
//! if !plan.is_empty() {
//!     let report = Executor::new(&backend, ApplyOptions::default())
//!         .with_snapshots(&store)
//!         .apply(&mut plan, &mut NoProgress)?
//!         .into_result()?;
//! }
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`StateCollector`]: reports what is installed and configured
//! - [`Backend`]: installs, removes and configures through providers
//! - [`Resolver`]: finds the latest version of an unpinned package
//! - [`ProgressCallback`]: receives progress updates
//!
//! This allows the crate to be used without hard dependencies on
//! specific package managers or UI frameworks.

pub mod compiler;
pub mod context;
pub mod diff;
pub mod document;
pub mod error;
pub mod executor;
pub mod fleet;
pub mod planner;
pub mod step;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export main types at crate root
pub use compiler::{Compiler, ProviderSet};
pub use context::{
    ApplyContext, Backend, CancelToken, NoProgress, NoResolver, ProgressCallback, ResourceKind,
    Resolver, StateCollector,
};
pub use diff::{Diff, DiffKind, DiffSummary, Differ, compare, group_by_provider};
pub use document::{Document, Scalar};
pub use error::{Error, Result};
pub use executor::{ApplyReport, Executor};
pub use planner::{ExecutionPlan, PlanEntry, Planner};
pub use step::{
    ConfigStep, Ensure, FILES_PROVIDER, FileStep, PackageStep, Phase, SharedStep, Step, StepKey,
};
pub use types::{
    ApplyOptions, ApplyResult, ApplySummary, PlanOptions, ReproducibilityMode, Status, StepResult,
};
