//! Source list resolution
//!
//! Decides which sources to fetch and which configuration overrides to
//! apply. Precedence, lowest first:
//! 1. The catalog's fallback example sources, no overrides
//! 2. Share-state sources (when non-empty) and share-state overrides
//! 3. An explicit example index: the entry's sources and its graph config
//!    replace whatever 1-2 produced, wholesale
//!
//! An example index that does not name a catalog entry is an error; the
//! resolver never falls back silently.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::ExampleCatalog;
use crate::config::{fragments_from_config, MergeError, OverrideFragment};
use crate::share::{ShareState, ShareStateError, EXAMPLE_PARAM, GRAPH_CONFIG_PARAM, SOURCE_PARAM};

/// Resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Example index {index} is out of range (catalog has {len} examples)")]
    InvalidExampleIndex { index: i64, len: usize },

    #[error(transparent)]
    Override(#[from] MergeError),

    #[error("share state error: {0}")]
    ShareState(#[from] ShareStateError),
}

/// Which input the resolved sources came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum ResolutionOrigin {
    /// Catalog fallback example
    Fallback(usize),
    /// Share-state source list
    ShareState,
    /// Explicitly selected example
    Example(usize),
}

/// Final (sources, overrides) pair for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// Sources to dispatch, in order
    pub sources: Vec<String>,

    /// Overrides to apply to the base configuration, in order
    pub overrides: Vec<OverrideFragment>,

    /// Where `sources` came from
    pub origin: ResolutionOrigin,
}

impl Resolution {
    /// Whether there is nothing to dispatch
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Raw inputs read from share state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveInputs {
    /// Share-state sources, `None` when absent
    pub sources: Option<Vec<String>>,

    /// Share-state override fragments
    pub overrides: Vec<OverrideFragment>,

    /// Explicit example index
    pub example: Option<i64>,
}

impl ResolveInputs {
    /// Read the three resolver inputs from share state.
    ///
    /// Override entries may be encoded strings (`section|{...}`) or objects
    /// of the form `{"section": "...", "values": {...}}`.
    pub fn from_share_state(state: &dyn ShareState) -> Result<Self, ResolveError> {
        let sources = state.get_arr(SOURCE_PARAM, Vec::new())?;
        let overrides = state
            .get_obj_arr(GRAPH_CONFIG_PARAM, Vec::new())?
            .iter()
            .map(fragment_from_value)
            .collect::<Result<Vec<_>, _>>()?;
        let example = state.get_int(EXAMPLE_PARAM, None)?;

        Ok(Self {
            sources: if sources.is_empty() { None } else { Some(sources) },
            overrides,
            example,
        })
    }
}

fn fragment_from_value(value: &Value) -> Result<OverrideFragment, MergeError> {
    match value {
        Value::String(encoded) => OverrideFragment::decode(encoded),
        Value::Object(map) => {
            let section = map.get("section").and_then(Value::as_str).unwrap_or_default();
            match (section, map.get("values")) {
                ("", _) => Err(MergeError::MalformedOverride {
                    section: String::new(),
                    reason: "missing section name".to_string(),
                }),
                (section, Some(values)) => Ok(OverrideFragment::new(section, values.to_string())),
                (section, None) => Err(MergeError::MalformedOverride {
                    section: section.to_string(),
                    reason: "missing values".to_string(),
                }),
            }
        }
        other => Err(MergeError::MalformedOverride {
            section: other.to_string(),
            reason: "expected an encoded string or an object".to_string(),
        }),
    }
}

/// Resolves sources and overrides against a catalog
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    catalog: &'a ExampleCatalog,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a ExampleCatalog) -> Self {
        Self { catalog }
    }

    /// Read inputs from share state and resolve them
    pub fn resolve(&self, state: &dyn ShareState) -> Result<Resolution, ResolveError> {
        let inputs = ResolveInputs::from_share_state(state)?;
        self.resolve_inputs(inputs)
    }

    /// Resolve already-read inputs
    pub fn resolve_inputs(&self, inputs: ResolveInputs) -> Result<Resolution, ResolveError> {
        if let Some(index) = inputs.example {
            let entry = usize::try_from(index)
                .ok()
                .and_then(|i| self.catalog.get(i).map(|entry| (i, entry)));

            let Some((index, entry)) = entry else {
                return Err(ResolveError::InvalidExampleIndex {
                    index,
                    len: self.catalog.len(),
                });
            };

            if inputs.sources.is_some() || !inputs.overrides.is_empty() {
                debug!(index, "example index supersedes share-state sources and overrides");
            }
            info!(index, name = %entry.name, sources = entry.sources.len(), "resolved example");

            return Ok(Resolution {
                sources: entry.sources.clone(),
                overrides: entry
                    .graph_config
                    .as_ref()
                    .map(fragments_from_config)
                    .unwrap_or_default(),
                origin: ResolutionOrigin::Example(index),
            });
        }

        let (sources, origin) = match inputs.sources {
            Some(sources) if !sources.is_empty() => (sources, ResolutionOrigin::ShareState),
            _ => (
                self.catalog.fallback().sources.clone(),
                ResolutionOrigin::Fallback(self.catalog.fallback_index()),
            ),
        };
        info!(?origin, sources = sources.len(), overrides = inputs.overrides.len(), "resolved sources");

        Ok(Resolution {
            sources,
            overrides: inputs.overrides,
            origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExampleEntry;
    use crate::config::Configuration;
    use crate::share::JsonShareState;
    use serde_json::json;

    fn catalog() -> ExampleCatalog {
        let mut config = Configuration::new();
        config.set("viz", "show_labels", json!(true));

        ExampleCatalog::new(
            vec![
                ExampleEntry::new("zero", vec!["z1".to_string()]),
                ExampleEntry::new("one", vec!["o1".to_string(), "o2".to_string()])
                    .with_graph_config(config),
                ExampleEntry::new("empty", vec![]),
            ],
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_default_is_fallback() {
        let catalog = catalog();
        let resolution = Resolver::new(&catalog).resolve(&JsonShareState::new()).unwrap();

        assert_eq!(resolution.sources, vec!["z1"]);
        assert!(resolution.overrides.is_empty());
        assert_eq!(resolution.origin, ResolutionOrigin::Fallback(0));
    }

    #[test]
    fn test_share_sources_replace_fallback() {
        let catalog = catalog();
        let state = JsonShareState::new()
            .with(SOURCE_PARAM, json!(["u1", "u2", "u1"]))
            .with(GRAPH_CONFIG_PARAM, json!([r#"viz|{"a":1}"#]));

        let resolution = Resolver::new(&catalog).resolve(&state).unwrap();
        assert_eq!(resolution.sources, vec!["u1", "u2", "u1"]);
        assert_eq!(resolution.overrides, vec![OverrideFragment::new("viz", r#"{"a":1}"#)]);
        assert_eq!(resolution.origin, ResolutionOrigin::ShareState);
    }

    #[test]
    fn test_overrides_without_sources_keep_fallback_sources() {
        let catalog = catalog();
        let state = JsonShareState::new().with(GRAPH_CONFIG_PARAM, json!([r#"viz|{"a":1}"#]));

        let resolution = Resolver::new(&catalog).resolve(&state).unwrap();
        assert_eq!(resolution.sources, vec!["z1"]);
        assert_eq!(resolution.overrides.len(), 1);
    }

    #[test]
    fn test_empty_share_sources_use_fallback() {
        let catalog = catalog();
        let state = JsonShareState::new().with(SOURCE_PARAM, json!([]));

        let resolution = Resolver::new(&catalog).resolve(&state).unwrap();
        assert_eq!(resolution.origin, ResolutionOrigin::Fallback(0));
    }

    #[test]
    fn test_example_supersedes_everything() {
        let catalog = catalog();
        let state = JsonShareState::new()
            .with(SOURCE_PARAM, json!(["u1", "u2"]))
            .with(GRAPH_CONFIG_PARAM, json!([r#"nodes|{"size":9}"#]))
            .with(EXAMPLE_PARAM, json!(1));

        let resolution = Resolver::new(&catalog).resolve(&state).unwrap();
        assert_eq!(resolution.sources, vec!["o1", "o2"]);
        assert_eq!(resolution.origin, ResolutionOrigin::Example(1));
        assert_eq!(resolution.overrides.len(), 1);
        assert_eq!(resolution.overrides[0].section, "viz");
    }

    #[test]
    fn test_example_without_config_clears_overrides() {
        let catalog = catalog();
        let state = JsonShareState::new()
            .with(GRAPH_CONFIG_PARAM, json!([r#"nodes|{"size":9}"#]))
            .with(EXAMPLE_PARAM, json!(0));

        let resolution = Resolver::new(&catalog).resolve(&state).unwrap();
        assert!(resolution.overrides.is_empty());
    }

    #[test]
    fn test_example_with_no_sources_resolves_empty() {
        let catalog = catalog();
        let state = JsonShareState::new().with(EXAMPLE_PARAM, json!(2));

        let resolution = Resolver::new(&catalog).resolve(&state).unwrap();
        assert!(resolution.is_empty());
    }

    #[test]
    fn test_invalid_example_index() {
        let catalog = catalog();
        for index in [3, 100, -1] {
            let state = JsonShareState::new().with(EXAMPLE_PARAM, json!(index));
            let err = Resolver::new(&catalog).resolve(&state).unwrap_err();
            assert!(
                matches!(err, ResolveError::InvalidExampleIndex { index: i, len: 3 } if i == index),
                "unexpected error for {}: {}",
                index,
                err
            );
        }
    }

    #[test]
    fn test_object_override_entries() {
        let catalog = catalog();
        let state = JsonShareState::new().with(
            GRAPH_CONFIG_PARAM,
            json!([{"section": "viz", "values": {"show_labels": false}}]),
        );

        let resolution = Resolver::new(&catalog).resolve(&state).unwrap();
        let parsed = resolution.overrides[0].parse_payload().unwrap();
        assert_eq!(parsed["show_labels"], json!(false));
    }

    #[test]
    fn test_malformed_override_entries() {
        let catalog = catalog();
        for entry in [json!("no-separator"), json!({"values": {}}), json!({"section": "viz"}), json!(7)] {
            let state = JsonShareState::new().with(GRAPH_CONFIG_PARAM, json!([entry]));
            let err = Resolver::new(&catalog).resolve(&state).unwrap_err();
            assert!(matches!(err, ResolveError::Override(MergeError::MalformedOverride { .. })));
        }
    }
}
