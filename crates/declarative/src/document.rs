//! Structured documents for desired and observed state
//!
//! Layers, provider observations and step targets are all trees of
//! [`Document`] values. Equality between a desired and an observed value is
//! decided on [`Document::display_form`], so `1`, `1.0` and `"1"` compare
//! equal. That normalization is deliberate: providers report versions and
//! settings as strings while layers often spell them as numbers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A leaf value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// A tagged tree: scalar, sequence or string-keyed mapping.
///
/// Mappings keep the order keys were declared in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Document {
    Scalar(Scalar),
    Sequence(Vec<Document>),
    Mapping(IndexMap<String, Document>),
}

impl Default for Document {
    fn default() -> Self {
        Self::Scalar(Scalar::Null)
    }
}

impl Document {
    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Str(s.into()))
    }

    pub fn mapping() -> Self {
        Self::Mapping(IndexMap::new())
    }

    /// Build a mapping from key/value pairs
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Document)>,
    {
        Self::Mapping(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Document>> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Document]> {
        match self {
            Self::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// String content of a string scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Scalar rendered as text, for fields like versions that may be numbers
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Self::Scalar(Scalar::Null) => None,
            Self::Scalar(s) => Some(s.to_string()),
            _ => None,
        }
    }

    /// Child of a mapping
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// Walk a dotted path through nested mappings
    pub fn get_path(&self, path: &str) -> Option<&Document> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |doc, key| doc.get(key))
    }

    /// Insert into a mapping, turning `self` into a mapping if it is not one
    pub fn insert(&mut self, key: impl Into<String>, value: Document) {
        if !matches!(self, Self::Mapping(_)) {
            *self = Self::mapping();
        }
        if let Self::Mapping(m) = self {
            m.insert(key.into(), value);
        }
    }

    /// Stable textual form used for equality between documents.
    ///
    /// Scalars render without quotes, sequences as `[a, b]`, mappings as
    /// `{k: v}` sorted by key, so declaration order does not matter.
    pub fn display_form(&self) -> String {
        match self {
            Self::Scalar(s) => s.to_string(),
            Self::Sequence(items) => {
                let inner: Vec<String> = items.iter().map(Document::display_form).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Mapping(map) => {
                let mut fields: Vec<_> = map.iter().collect();
                fields.sort_by(|a, b| a.0.cmp(b.0));
                let inner: Vec<String> = fields
                    .into_iter()
                    .map(|(k, v)| format!("{}: {}", k, v.display_form()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }

    /// Equality by display form
    pub fn equivalent(&self, other: &Document) -> bool {
        self.display_form() == other.display_form()
    }

    /// Merge `other` into `self`: mappings merge key-wise, sequences
    /// concatenate, anything else is replaced by `other`. Keys new to `self`
    /// are appended after its own.
    pub fn deep_merge(&mut self, other: Document) {
        match (self, other) {
            (Self::Mapping(base), Self::Mapping(overlay)) => {
                for (key, value) in overlay {
                    match base.get_mut(&key) {
                        Some(existing) => existing.deep_merge(value),
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
            }
            (Self::Sequence(base), Self::Sequence(overlay)) => base.extend(overlay),
            (slot, other) => *slot = other,
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_form())
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Self::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for Document {
    fn from(i: i64) -> Self {
        Self::Scalar(Scalar::Int(i))
    }
}

impl From<f64> for Document {
    fn from(x: f64) -> Self {
        Self::Scalar(Scalar::Float(x))
    }
}
