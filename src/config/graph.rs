//! Graph configuration value
//!
//! A configuration is a two-level mapping: section name → key → JSON value.
//! It is an explicit value owned by the caller; components that change it
//! take `&mut Configuration`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Section name → (key → value)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    sections: BTreeMap<String, Map<String, Value>>,
}

impl Configuration {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object of objects.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Convert to a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.sections
                .iter()
                .map(|(name, section)| (name.clone(), Value::Object(section.clone())))
                .collect(),
        )
    }

    /// Look up a single key
    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section).and_then(|s| s.get(key))
    }

    /// Look up a whole section
    pub fn section(&self, section: &str) -> Option<&Map<String, Value>> {
        self.sections.get(section)
    }

    /// Set `section.key`, creating the section if it does not exist.
    ///
    /// Returns the previous value, if any.
    pub fn set(&mut self, section: &str, key: impl Into<String>, value: Value) -> Option<Value> {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.into(), value)
    }

    /// Section names in sorted order
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Iterate over all sections
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Map<String, Value>)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// SHA-256 over the RFC 8785 canonical form.
    ///
    /// Two configurations with the same content have the same digest
    /// regardless of the order keys were set in.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let jcs_bytes = serde_json_canonicalizer::to_vec(&self.to_value())?;
        let mut hasher = Sha256::new();
        hasher.update(&jcs_bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}
