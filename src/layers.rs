//! Desired-state layers
//!
//! Each layer is a YAML document; later layers are deep-merged over earlier
//! ones.

use anyhow::{Context, Result};
use declarative::Document;
use std::fs;
use std::path::{Path, PathBuf};

/// Load one layer. An empty file is an empty document.
pub fn load_layer(path: &Path) -> Result<Document> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read layer {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Document::null());
    }
    serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", path.display()))
}

/// Load and merge `paths` in order
pub fn load(paths: &[PathBuf]) -> Result<Document> {
    let mut merged = Document::null();
    for path in paths {
        let layer = load_layer(path)?;
        if layer.is_null() {
            log::debug!("Skipping empty layer {}", path.display());
            continue;
        }
        log::debug!("Merging layer {}", path.display());
        merged.deep_merge(layer);
    }
    Ok(merged)
}
