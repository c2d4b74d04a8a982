use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

/// Versioned, static list of entities to lay out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub version: String,
    pub entities: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    /// Free-form attributes (e.g. `severity` for threats)
    #[serde(default)]
    pub characteristics: Map<String, Value>,
}

impl CatalogEntry {
    pub fn characteristic_str(&self, key: &str) -> Option<&str> {
        self.characteristics.get(key).and_then(|v| v.as_str())
    }
}

impl Catalog {
    /// Parse a catalog from JSON and check that entity ids are unique.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json).context("Failed to parse catalog JSON")?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entities {
            if entry.id.trim().is_empty() {
                bail!("catalog entry with empty id");
            }
            if !seen.insert(entry.id.as_str()) {
                bail!("duplicate catalog id '{}'", entry.id);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
