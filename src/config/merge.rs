//! Override merge
//!
//! Fragments apply to a [`Configuration`] section by section and key by key.
//! The last write wins and nothing is removed.

use tracing::debug;

use super::fragment::{MergeError, OverrideFragment};
use super::graph::Configuration;

/// Apply `fragments` to `base` in order, mutating it in place.
///
/// Each fragment is all-or-nothing: its payload is parsed before any key is
/// written, so a malformed fragment leaves `base` untouched. Fragments that
/// were applied before a malformed one stay applied.
pub fn merge_overrides<'a>(
    base: &'a mut Configuration,
    fragments: &[OverrideFragment],
) -> Result<&'a mut Configuration, MergeError> {
    for fragment in fragments {
        let entries = fragment.parse_payload()?;
        debug!(section = %fragment.section, keys = entries.len(), "applying override");
        for (key, value) in entries {
            base.set(&fragment.section, key, value);
        }
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_key_last_wins() {
        let mut config = Configuration::new();
        let fragments = vec![
            OverrideFragment::new("viz", r#"{"a":1}"#),
            OverrideFragment::new("viz", r#"{"a":2}"#),
        ];
        merge_overrides(&mut config, &fragments).unwrap();
        assert_eq!(config.to_value(), json!({"viz": {"a": 2}}));
    }

    #[test]
    fn test_distinct_keys_are_additive() {
        let mut config = Configuration::new();
        let fragments = vec![
            OverrideFragment::new("viz", r#"{"a":1}"#),
            OverrideFragment::new("viz", r#"{"b":2}"#),
        ];
        merge_overrides(&mut config, &fragments).unwrap();
        assert_eq!(config.to_value(), json!({"viz": {"a": 1, "b": 2}}));
    }

    #[test]
    fn test_existing_keys_survive() {
        let mut config = Configuration::new();
        config.set("layout", "iterations", json!(300));
        config.set("layout", "gravity", json!(0.1));

        merge_overrides(&mut config, &[OverrideFragment::new("layout", r#"{"gravity":0.5}"#)])
            .unwrap();

        assert_eq!(config.get("layout", "iterations"), Some(&json!(300)));
        assert_eq!(config.get("layout", "gravity"), Some(&json!(0.5)));
    }

    #[test]
    fn test_malformed_leaves_section_unchanged() {
        let mut config = Configuration::new();
        config.set("viz", "a", json!(1));
        let before = config.clone();

        let err = merge_overrides(&mut config, &[OverrideFragment::new("viz", "not-json")])
            .unwrap_err();

        assert!(matches!(err, MergeError::MalformedOverride { ref section, .. } if section == "viz"));
        assert_eq!(config, before);
    }

    #[test]
    fn test_no_rollback_across_fragments() {
        let mut config = Configuration::new();
        let fragments = vec![
            OverrideFragment::new("viz", r#"{"a":1}"#),
            OverrideFragment::new("edges", "{oops"),
            OverrideFragment::new("viz", r#"{"b":2}"#),
        ];

        let err = merge_overrides(&mut config, &fragments).unwrap_err();
        assert_eq!(err.section(), "edges");
        assert_eq!(config.get("viz", "a"), Some(&json!(1)));
        assert!(config.get("viz", "b").is_none());
        assert!(config.section("edges").is_none());
    }

    #[test]
    fn test_empty_payload_is_valid() {
        let mut config = Configuration::new();
        merge_overrides(&mut config, &[OverrideFragment::new("viz", "{}")]).unwrap();
        assert!(config.get("viz", "a").is_none());
    }
}
