//! Shell backend: provider operations as configured command templates

use anyhow::{Context, Result};
use declarative::{Backend, Document, ResourceKind, Resolver, StateCollector};
use std::collections::BTreeMap;

use crate::config::ProviderCommands;
use crate::runner;

/// Runs `[providers.<name>]` templates through `sh -c`
pub struct ShellBackend {
    providers: BTreeMap<String, ProviderCommands>,
}

impl ShellBackend {
    pub fn new(providers: BTreeMap<String, ProviderCommands>) -> Self {
        Self { providers }
    }

    /// Provider names known to this backend
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    fn commands(&self, provider: &str) -> Result<&ProviderCommands> {
        self.providers
            .get(provider)
            .with_context(|| format!("No commands configured for provider '{provider}'"))
    }

    fn template<'a>(
        &'a self,
        provider: &str,
        op: &str,
        pick: impl Fn(&'a ProviderCommands) -> Option<&'a String>,
    ) -> Result<&'a str> {
        pick(self.commands(provider)?)
            .map(String::as_str)
            .with_context(|| format!("Provider '{provider}' has no '{op}' command"))
    }
}

impl StateCollector for ShellBackend {
    fn observe(&self, provider: &str, kind: ResourceKind, name: &str) -> Result<Option<Document>> {
        let script = match kind {
            ResourceKind::Package => {
                let template = self.template(provider, "query", |c| c.query.as_ref())?;
                render(template, &[("name", name)])
            }
            ResourceKind::Config => {
                let template = self.template(provider, "get", |c| c.get.as_ref())?;
                render(template, &[("key", name)])
            }
        };

        let output = runner::shell(&script)?;
        if !output.success {
            return Ok(None);
        }

        Ok(Some(match kind {
            ResourceKind::Package => match output.stdout.lines().next() {
                Some(version) if !version.trim().is_empty() => {
                    Document::from_pairs([("version", Document::from(version.trim()))])
                }
                _ => Document::mapping(),
            },
            ResourceKind::Config => Document::from(output.stdout),
        }))
    }
}

impl Backend for ShellBackend {
    fn install(&self, provider: &str, name: &str, version: Option<&str>) -> Result<()> {
        let template = self.template(provider, "install", |c| c.install.as_ref())?;
        let spec = match version {
            Some(v) => format!("{name}@{v}"),
            None => name.to_string(),
        };
        let script = render(
            template,
            &[
                ("name", name),
                ("version", version.unwrap_or_default()),
                ("spec", &spec),
            ],
        );
        runner::shell_checked(&script)
            .with_context(|| format!("Failed to install {provider} {spec}"))?;
        Ok(())
    }

    fn remove(&self, provider: &str, name: &str) -> Result<()> {
        let template = self.template(provider, "remove", |c| c.remove.as_ref())?;
        runner::shell_checked(&render(template, &[("name", name)]))
            .with_context(|| format!("Failed to remove {provider} {name}"))?;
        Ok(())
    }

    fn configure(&self, provider: &str, key: &str, value: &Document) -> Result<()> {
        let template = self.template(provider, "set", |c| c.set.as_ref())?;
        let value = value.display_form();
        runner::shell_checked(&render(template, &[("key", key), ("value", &value)]))
            .with_context(|| format!("Failed to set {provider} {key}"))?;
        Ok(())
    }

    fn unconfigure(&self, provider: &str, key: &str) -> Result<()> {
        let template = self.template(provider, "unset", |c| c.unset.as_ref())?;
        runner::shell_checked(&render(template, &[("key", key)]))
            .with_context(|| format!("Failed to unset {provider} {key}"))?;
        Ok(())
    }
}

impl Resolver for ShellBackend {
    fn latest(&self, provider: &str, name: &str) -> Result<Option<String>> {
        let Some(template) = self.commands(provider)?.latest.as_deref() else {
            return Ok(None);
        };
        let stdout = runner::shell_checked(&render(template, &[("name", name)]))
            .with_context(|| format!("Failed to resolve latest {provider} {name}"))?;
        Ok(stdout
            .lines()
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    }
}

/// Substitute `{placeholder}`s, quoting each value
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), &shell_quote(value))
    })
}

/// Quote for POSIX sh. Plain words pass through unchanged.
fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
