//! Configuration override fragments
//!
//! A fragment targets one section and carries a JSON-encoded partial mapping
//! of key → value. On the wire (shareable state) a fragment is written as
//! `<section>|<json object>`, e.g. `viz|{"node_size":4}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::graph::Configuration;

/// Separator between section name and payload in the encoded form
pub const FRAGMENT_SEPARATOR: char = '|';

/// A (section, JSON-encoded partial mapping) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideFragment {
    /// Target section
    pub section: String,

    /// JSON-encoded object of key → value (not yet parsed)
    pub payload: String,
}

/// Errors produced while decoding or applying fragments
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("malformed override for section '{section}': {reason}")]
    MalformedOverride { section: String, reason: String },
}

impl MergeError {
    /// The section named by the offending fragment
    pub fn section(&self) -> &str {
        match self {
            MergeError::MalformedOverride { section, .. } => section,
        }
    }
}

impl OverrideFragment {
    /// Create a fragment from a section and a raw payload
    pub fn new(section: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            payload: payload.into(),
        }
    }

    /// Decode the `<section>|<json>` form.
    ///
    /// Only the first separator splits; the payload may itself contain `|`.
    /// The payload is not parsed here; that happens when it is applied.
    pub fn decode(encoded: &str) -> Result<Self, MergeError> {
        match encoded.split_once(FRAGMENT_SEPARATOR) {
            Some((section, payload)) if !section.is_empty() => Ok(Self::new(section, payload)),
            Some(_) => Err(MergeError::MalformedOverride {
                section: String::new(),
                reason: "empty section name".to_string(),
            }),
            None => Err(MergeError::MalformedOverride {
                section: encoded.to_string(),
                reason: format!("missing '{}' separator", FRAGMENT_SEPARATOR),
            }),
        }
    }

    /// Decode every entry of an encoded list, stopping at the first bad one.
    pub fn decode_all<S: AsRef<str>>(encoded: &[S]) -> Result<Vec<Self>, MergeError> {
        encoded.iter().map(|e| Self::decode(e.as_ref())).collect()
    }

    /// Encode back to `<section>|<json>`
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.section, FRAGMENT_SEPARATOR, self.payload)
    }

    /// Parse the payload into a key → value mapping.
    ///
    /// A payload that is valid JSON but not an object is malformed too.
    pub fn parse_payload(&self) -> Result<Map<String, Value>, MergeError> {
        match serde_json::from_str::<Value>(&self.payload) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(MergeError::MalformedOverride {
                section: self.section.clone(),
                reason: format!("expected a JSON object, found {}", json_type_name(&other)),
            }),
            Err(e) => Err(MergeError::MalformedOverride {
                section: self.section.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Split a partial configuration into one fragment per section, in section order.
pub fn fragments_from_config(config: &Configuration) -> Vec<OverrideFragment> {
    config
        .sections()
        .map(|(name, section)| {
            OverrideFragment::new(name, Value::Object(section.clone()).to_string())
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
