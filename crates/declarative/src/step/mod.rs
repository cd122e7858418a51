//! Step trait for declarative state management
//!
//! A Step is one idempotent unit of change: it knows what it wants, how to
//! look at what is there, and how to converge the two.

mod config;
mod file;
mod package;

pub use config::ConfigStep;
pub use file::{FileStep, FILES_PROVIDER};
pub use package::{Ensure, PackageStep};

use crate::context::{ApplyContext, StateCollector};
use crate::document::Document;
use crate::types::ApplyResult;
use anyhow::Result;
use lockfile::LockChange;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Ordering phase. Every install runs before any configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Install,
    Configure,
}

/// Core trait for compiled steps
///
/// Steps are immutable once compiled. `apply` must be idempotent so a
/// partially applied plan can be re-planned and applied again.
///
/// # Example
///
/// ```ignore
/// use declarative::{ApplyContext, ApplyResult, Document, Phase, Step};
///
/// #[derive(Debug)]
/// struct Motd(String);
///
/// impl Step for Motd {
///     fn id(&self) -> String { "motd:write:banner".into() }
///     fn provider(&self) -> &str { "motd" }
///     fn resource(&self) -> String { "banner".into() }
///     fn phase(&self) -> Phase { Phase::Configure }
///     fn description(&self) -> String { "Write the login banner".into() }
///     fn desired(&self) -> Option<Document> { Some(self.0.as_str().into()) }
///
///     fn apply(&self, ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
///         ctx.backend.configure("motd", "banner", &self.0.as_str().into())?;
///         Ok(ApplyResult::Modified)
///     }
/// }
/// ```
pub trait Step: Send + Sync + fmt::Debug {
    /// Stable identifier, `provider:action:resource`
    fn id(&self) -> String;

    fn provider(&self) -> &str;

    /// Name of the managed resource within its provider
    fn resource(&self) -> String;

    fn phase(&self) -> Phase;

    /// Human-readable description of what this step does
    fn description(&self) -> String;

    /// Desired value, `None` when the resource should be absent
    fn desired(&self) -> Option<Document>;

    /// Observed value, `None` when the resource is absent
    fn observe(&self, collector: &dyn StateCollector) -> Result<Option<Document>>;

    /// Files this step may overwrite or delete
    fn touches(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Lockfile change to record once the step is satisfied
    fn lock_change(&self, _collector: &dyn StateCollector) -> Result<Option<LockChange>> {
        Ok(None)
    }

    /// Apply changes to reach the desired state
    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult>;
}

/// A step shared between the compiled list and plan entries
pub type SharedStep = Arc<dyn Step>;

/// Identity used to deduplicate steps declared in several layers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepKey {
    pub provider: String,
    pub resource: String,
}

impl StepKey {
    pub fn of(step: &dyn Step) -> Self {
        Self {
            provider: step.provider().to_string(),
            resource: step.resource(),
        }
    }
}
