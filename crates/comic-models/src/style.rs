//! Style catalog.
//!
//! Styles are loaded from a JSON document mapping style name to its
//! definition (at minimum a `prompt`). The catalog is the single source of
//! truth for which style names are valid anywhere in the system.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single style definition.
///
/// Fields other than `prompt` are carried through untouched so the catalog
/// endpoint can return the document as it was loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StyleDefinition {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// Style name to definition mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleCatalog {
    styles: BTreeMap<String, StyleDefinition>,
}

impl StyleCatalog {
    /// Parse a catalog from JSON text.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: StyleCatalog = serde_json::from_str(json)?;
        Ok(catalog)
    }

    /// Load a catalog from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&text)
    }

    /// Build a catalog from `(name, prompt)` pairs.
    pub fn from_prompts<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            styles: entries
                .into_iter()
                .map(|(k, v)| (k.into(), StyleDefinition::new(v)))
                .collect(),
        }
    }

    /// Look up a usable style. Entries without a prompt are not usable.
    pub fn get(&self, name: &str) -> Option<&StyleDefinition> {
        self.styles.get(name).filter(|s| {
            s.prompt
                .as_deref()
                .is_some_and(|prompt| !prompt.trim().is_empty())
        })
    }

    /// Whether `name` is a valid style.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Prompt text for a style.
    pub fn prompt(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|s| s.prompt.as_deref())
    }

    /// Style names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.styles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

/// Style catalog loading error.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read style catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid style catalog: {0}")]
    Json(#[from] serde_json::Error),
}
