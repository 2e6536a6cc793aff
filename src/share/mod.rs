//! Shareable state
//!
//! Share state is the small set of named parameters a user can pass around
//! to reproduce a view: which sources to load, graph configuration
//! overrides, and optionally an example index. [`ShareState`] is the
//! reader interface; [`JsonShareState`] reads the parameters from a JSON
//! object such as
//!
//! ```json
//! {"source": ["https://a", "https://b"], "graph_config": ["viz|{\"show_labels\":true}"], "example": 2}
//! ```

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// Parameter holding the source list
pub const SOURCE_PARAM: &str = "source";

/// Parameter holding graph configuration override fragments
pub const GRAPH_CONFIG_PARAM: &str = "graph_config";

/// Parameter holding the example index
pub const EXAMPLE_PARAM: &str = "example";

/// Share state errors
#[derive(Debug, thiserror::Error)]
pub enum ShareStateError {
    #[error("Failed to read share state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse share state JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Share state must be a JSON object")]
    NotAnObject,

    #[error("Parameter '{name}': expected {expected}")]
    WrongType { name: String, expected: &'static str },
}

/// Read access to share state parameters.
///
/// Absent (or null) parameters yield the supplied default.
pub trait ShareState {
    /// Read an array of strings
    fn get_arr(&self, name: &str, default: Vec<String>) -> Result<Vec<String>, ShareStateError>;

    /// Read an array of arbitrary JSON values
    fn get_obj_arr(&self, name: &str, default: Vec<Value>) -> Result<Vec<Value>, ShareStateError>;

    /// Read an integer
    fn get_int(&self, name: &str, default: Option<i64>) -> Result<Option<i64>, ShareStateError>;
}

/// Share state backed by a JSON object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonShareState {
    params: Map<String, Value>,
}

impl JsonShareState {
    /// Empty share state (every read returns its default)
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse share state from a JSON string
    pub fn parse(content: &str) -> Result<Self, ShareStateError> {
        match serde_json::from_str(content)? {
            Value::Object(params) => Ok(Self { params }),
            _ => Err(ShareStateError::NotAnObject),
        }
    }

    /// Load share state from a JSON file
    pub fn load(path: &Path) -> Result<Self, ShareStateError> {
        let content = std::fs::read_to_string(path).map_err(|source| ShareStateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Set a parameter
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Raw parameter access
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.params.get(name).filter(|v| !v.is_null())
    }
}

impl ShareState for JsonShareState {
    fn get_arr(&self, name: &str, default: Vec<String>) -> Result<Vec<String>, ShareStateError> {
        let Some(value) = self.raw(name) else {
            return Ok(default);
        };
        let wrong_type = || ShareStateError::WrongType {
            name: name.to_string(),
            expected: "an array of strings",
        };
        value
            .as_array()
            .ok_or_else(wrong_type)?
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(wrong_type))
            .collect()
    }

    fn get_obj_arr(&self, name: &str, default: Vec<Value>) -> Result<Vec<Value>, ShareStateError> {
        match self.raw(name) {
            None => Ok(default),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(ShareStateError::WrongType {
                name: name.to_string(),
                expected: "an array",
            }),
        }
    }

    fn get_int(&self, name: &str, default: Option<i64>) -> Result<Option<i64>, ShareStateError> {
        match self.raw(name) {
            None => Ok(default),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| ShareStateError::WrongType {
                name: name.to_string(),
                expected: "an integer",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_returns_default() {
        let state = JsonShareState::new();
        assert_eq!(
            state.get_arr(SOURCE_PARAM, vec!["d".to_string()]).unwrap(),
            vec!["d".to_string()]
        );
        assert!(state.get_obj_arr(GRAPH_CONFIG_PARAM, vec![]).unwrap().is_empty());
        assert_eq!(state.get_int(EXAMPLE_PARAM, None).unwrap(), None);
        assert_eq!(state.get_int(EXAMPLE_PARAM, Some(4)).unwrap(), Some(4));
    }

    #[test]
    fn test_null_is_absent() {
        let state = JsonShareState::parse(r#"{"example": null}"#).unwrap();
        assert_eq!(state.get_int(EXAMPLE_PARAM, None).unwrap(), None);
    }

    #[test]
    fn test_reads_present_values() {
        let state = JsonShareState::parse(
            r#"{"source": ["u1", "u2"], "graph_config": ["viz|{}", {"section": "x"}], "example": 3}"#,
        )
        .unwrap();

        assert_eq!(state.get_arr(SOURCE_PARAM, vec![]).unwrap(), vec!["u1", "u2"]);
        assert_eq!(state.get_obj_arr(GRAPH_CONFIG_PARAM, vec![]).unwrap().len(), 2);
        assert_eq!(state.get_int(EXAMPLE_PARAM, None).unwrap(), Some(3));
    }

    #[test]
    fn test_wrong_types() {
        let state = JsonShareState::new()
            .with(SOURCE_PARAM, json!(["u1", 2]))
            .with(EXAMPLE_PARAM, json!("three"))
            .with(GRAPH_CONFIG_PARAM, json!({"viz": {}}));

        assert!(matches!(
            state.get_arr(SOURCE_PARAM, vec![]),
            Err(ShareStateError::WrongType { .. })
        ));
        assert!(state.get_int(EXAMPLE_PARAM, None).is_err());
        assert!(state.get_obj_arr(GRAPH_CONFIG_PARAM, vec![]).is_err());
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(
            JsonShareState::parse("[1, 2]"),
            Err(ShareStateError::NotAnObject)
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = JsonShareState::load(Path::new("/nonexistent/share.json")).unwrap_err();
        assert!(matches!(err, ShareStateError::Io { .. }));
    }
}
