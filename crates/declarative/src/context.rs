//! Apply context and collaborator traits
//!
//! These traits let the engine run without depending on a particular
//! package manager, progress UI or version source.

use crate::document::Document;
use crate::types::StepResult;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What kind of resource a provider is asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Package,
    Config,
}

/// Reports what is currently true of the machine
pub trait StateCollector: Send + Sync {
    /// Observed value for one resource, `None` when it is absent.
    ///
    /// Packages are reported as a mapping with a `version` field.
    fn observe(&self, provider: &str, kind: ResourceKind, name: &str) -> Result<Option<Document>>;
}

/// Makes changes through a provider
pub trait Backend: Send + Sync {
    fn install(&self, provider: &str, name: &str, version: Option<&str>) -> Result<()>;

    fn remove(&self, provider: &str, name: &str) -> Result<()>;

    fn configure(&self, provider: &str, key: &str, value: &Document) -> Result<()>;

    fn unconfigure(&self, provider: &str, key: &str) -> Result<()>;
}

/// Finds the version an unpinned package would resolve to
pub trait Resolver: Send + Sync {
    fn latest(&self, provider: &str, name: &str) -> Result<Option<String>>;
}

/// Resolver that never knows a version
pub struct NoResolver;

impl Resolver for NoResolver {
    fn latest(&self, _provider: &str, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Progress callback for execution operations
pub trait ProgressCallback: Send {
    /// Called once with the number of steps that will run
    fn on_apply_start(&mut self, pending: usize);

    fn on_step_start(&mut self, id: &str, description: &str);

    fn on_step_complete(&mut self, result: &StepResult);

    /// Called after a failed apply was restored from a snapshot set
    fn on_rollback(&mut self, _snapshot_id: &str) {}

    fn on_apply_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_apply_start(&mut self, _pending: usize) {}
    fn on_step_start(&mut self, _id: &str, _description: &str) {}
    fn on_step_complete(&mut self, _result: &StepResult) {}
    fn on_apply_complete(&mut self) {}
}

/// Shared cancellation signal, checked between steps and between hosts
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context passed to step apply operations
pub struct ApplyContext<'a> {
    pub backend: &'a dyn Backend,
    /// Whether to output verbose information
    pub verbose: bool,
}

impl<'a> ApplyContext<'a> {
    pub fn new(backend: &'a dyn Backend, verbose: bool) -> Self {
        Self { backend, verbose }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
