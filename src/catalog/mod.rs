//! Example catalog
//!
//! An ordered, immutable list of curated example stories. Each entry names a
//! set of sources and optionally a partial graph configuration. One entry is
//! the designated fallback used when share state names no sources.
//!
//! Catalog files are TOML:
//!
//! ```toml
//! fallback = 0
//!
//! [[example]]
//! name = "Local elections"
//! sources = ["https://news.example.com/a/1", "https://news.example.com/a/2"]
//!
//! [example.graph_config.viz]
//! show_labels = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// A named bundle of sources
///
/// An entry may list no sources at all; selecting it resolves to an empty
/// source list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleEntry {
    /// Display name
    pub name: String,

    /// Sources in dispatch order (duplicates allowed)
    pub sources: Vec<String>,

    /// Partial graph configuration applied when this example is selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_config: Option<Configuration>,
}

impl ExampleEntry {
    pub fn new(name: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            name: name.into(),
            sources,
            graph_config: None,
        }
    }

    /// Attach a partial graph configuration
    pub fn with_graph_config(mut self, config: Configuration) -> Self {
        self.graph_config = Some(config);
        self
    }
}

/// Errors that can occur when loading or validating a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Catalog file not found: {0}")]
    NotFound(PathBuf),

    #[error("Catalog has no examples")]
    Empty,

    #[error("Fallback example {fallback} is out of range (catalog has {len} examples)")]
    FallbackOutOfRange { fallback: usize, len: usize },
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    fallback: usize,

    #[serde(default, rename = "example")]
    examples: Vec<ExampleEntry>,
}

/// Ordered example list with a designated fallback
#[derive(Debug, Clone, Serialize)]
pub struct ExampleCatalog {
    entries: Vec<ExampleEntry>,
    fallback: usize,
}

impl ExampleCatalog {
    /// Build and validate a catalog
    pub fn new(entries: Vec<ExampleEntry>, fallback: usize) -> Result<Self, CatalogError> {
        let catalog = Self { entries, fallback };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a TOML file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a catalog from a TOML string
    pub fn parse(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::new(file.examples, file.fallback)
    }

    /// The catalog compiled into the binary
    pub fn builtin() -> Self {
        let mut election_viz = Configuration::new();
        election_viz.set("viz", "show_labels", serde_json::json!(true));
        election_viz.set("layout", "iterations", serde_json::json!(500));

        let mut single_nodes = Configuration::new();
        single_nodes.set("nodes", "scale_by_replies", serde_json::json!(false));

        Self {
            entries: vec![
                ExampleEntry::new(
                    "Energy prices across outlets",
                    vec![
                        "https://news.example.com/economy/energy-prices-rise".to_string(),
                        "https://daily.example.org/2021/10/energy-crunch".to_string(),
                        "https://forum.example.net/t/energy-prices/4411".to_string(),
                    ],
                ),
                ExampleEntry::new(
                    "Election night coverage",
                    vec![
                        "https://news.example.com/politics/election-results".to_string(),
                        "https://daily.example.org/2021/09/election-live".to_string(),
                    ],
                )
                .with_graph_config(election_viz),
                ExampleEntry::new(
                    "Single long thread",
                    vec!["https://forum.example.net/t/transit-plans/918".to_string()],
                )
                .with_graph_config(single_nodes),
                ExampleEntry::new(
                    "Vaccine rollout debate",
                    vec![
                        "https://news.example.com/health/vaccine-rollout".to_string(),
                        "https://daily.example.org/2021/03/vaccine-queue".to_string(),
                        "https://news.example.com/health/vaccine-rollout-update".to_string(),
                        "https://forum.example.net/t/vaccination-centres/2207".to_string(),
                    ],
                ),
            ],
            fallback: 0,
        }
    }

    /// Validate the catalog
    fn validate(&self) -> Result<(), CatalogError> {
        if self.entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        if self.fallback >= self.entries.len() {
            return Err(CatalogError::FallbackOutOfRange {
                fallback: self.fallback,
                len: self.entries.len(),
            });
        }

        Ok(())
    }

    /// Replace the fallback index
    pub fn with_fallback(mut self, fallback: usize) -> Result<Self, CatalogError> {
        self.fallback = fallback;
        self.validate()?;
        Ok(self)
    }

    /// Entry at `index`, if in range
    pub fn get(&self, index: usize) -> Option<&ExampleEntry> {
        self.entries.get(index)
    }

    /// The designated fallback entry
    pub fn fallback(&self) -> &ExampleEntry {
        &self.entries[self.fallback]
    }

    pub fn fallback_index(&self) -> usize {
        self.fallback
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExampleEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CATALOG: &str = r#"
fallback = 1

[[example]]
name = "first"
sources = ["a", "b"]

[[example]]
name = "second"
sources = ["c"]

[example.graph_config.viz]
show_labels = true
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = ExampleCatalog::parse(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.fallback().name, "second");

        let second = catalog.get(1).unwrap();
        let config = second.graph_config.as_ref().unwrap();
        assert_eq!(config.get("viz", "show_labels"), Some(&json!(true)));
        assert!(catalog.get(0).unwrap().graph_config.is_none());
        assert!(catalog.get(2).is_none());
    }

    #[test]
    fn test_empty_catalog() {
        assert!(matches!(ExampleCatalog::parse(""), Err(CatalogError::Empty)));
    }

    #[test]
    fn test_fallback_out_of_range() {
        let content = "fallback = 3\n[[example]]\nname = \"x\"\nsources = [\"a\"]\n";
        assert!(matches!(
            ExampleCatalog::parse(content),
            Err(CatalogError::FallbackOutOfRange { fallback: 3, len: 1 })
        ));
    }

    #[test]
    fn test_entry_without_sources_is_allowed() {
        let content = "[[example]]\nname = \"hollow\"\nsources = []\n";
        let catalog = ExampleCatalog::parse(content).unwrap();
        assert!(catalog.fallback().sources.is_empty());
    }

    #[test]
    fn test_with_fallback() {
        let catalog = ExampleCatalog::parse(CATALOG).unwrap();
        let catalog = catalog.with_fallback(0).unwrap();
        assert_eq!(catalog.fallback().name, "first");
        assert!(catalog.with_fallback(9).is_err());
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let builtin = ExampleCatalog::builtin();
        assert!(builtin.validate().is_ok());
        assert!(!builtin.fallback().sources.is_empty());
        assert!(builtin.iter().any(|e| e.graph_config.is_some()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ExampleCatalog::load(Path::new("/nonexistent/catalog.toml")).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }
}
