use super::{Phase, Step};
use crate::context::{ApplyContext, ResourceKind, StateCollector};
use crate::document::Document;
use crate::types::ApplyResult;
use anyhow::Result;

/// Set one configuration key through its provider.
///
/// A `None` value unsets the key.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigStep {
    pub provider: String,
    /// Dotted key, e.g. `user.email`
    pub key: String,
    pub value: Option<Document>,
}

impl ConfigStep {
    pub fn set(provider: &str, key: &str, value: Document) -> Self {
        Self {
            provider: provider.to_string(),
            key: key.to_string(),
            value: Some(value),
        }
    }

    pub fn unset(provider: &str, key: &str) -> Self {
        Self {
            provider: provider.to_string(),
            key: key.to_string(),
            value: None,
        }
    }
}

impl Step for ConfigStep {
    fn id(&self) -> String {
        format!("{}:config:{}", self.provider, self.key)
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn resource(&self) -> String {
        format!("config.{}", self.key)
    }

    fn phase(&self) -> Phase {
        Phase::Configure
    }

    fn description(&self) -> String {
        match &self.value {
            Some(v) => format!("Set {} {} = {}", self.provider, self.key, v),
            None => format!("Unset {} {}", self.provider, self.key),
        }
    }

    fn desired(&self) -> Option<Document> {
        self.value.clone()
    }

    fn observe(&self, collector: &dyn StateCollector) -> Result<Option<Document>> {
        collector.observe(&self.provider, ResourceKind::Config, &self.key)
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        match &self.value {
            Some(value) => {
                ctx.backend.configure(&self.provider, &self.key, value)?;
                Ok(ApplyResult::Modified)
            }
            None => {
                ctx.backend.unconfigure(&self.provider, &self.key)?;
                Ok(ApplyResult::Removed)
            }
        }
    }
}
