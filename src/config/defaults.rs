//! Built-in graph defaults
//!
//! Hardcoded defaults for every graph configuration section. Settings-file
//! defaults and share-state overrides are layered on top of these.

use serde::{Deserialize, Serialize};

use super::graph::Configuration;

/// Built-in default graph configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefaults {
    /// Force layout iterations (default: 300)
    pub layout_iterations: u32,

    /// Force layout gravity (default: 0.1)
    pub layout_gravity: f64,

    /// Preferred link distance in px (default: 30)
    pub layout_link_distance: u32,

    /// Base node radius in px (default: 4)
    pub node_size: u32,

    /// Scale nodes by number of replies (default: true)
    pub node_scale_by_replies: bool,

    /// Draw reply edges (default: true)
    pub edge_show_replies: bool,

    /// Edge weighting attribute (default: "none")
    pub edge_weight: String,

    /// Colour nodes by originating source (default: true)
    pub viz_color_by_source: bool,

    /// Render node labels (default: false)
    pub viz_show_labels: bool,
}

impl Default for GraphDefaults {
    fn default() -> Self {
        Self {
            layout_iterations: 300,
            layout_gravity: 0.1,
            layout_link_distance: 30,
            node_size: 4,
            node_scale_by_replies: true,
            edge_show_replies: true,
            edge_weight: "none".to_string(),
            viz_color_by_source: true,
            viz_show_labels: false,
        }
    }
}

impl GraphDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "layout": {
                "iterations": self.layout_iterations,
                "gravity": self.layout_gravity,
                "link_distance": self.layout_link_distance
            },
            "nodes": {
                "size": self.node_size,
                "scale_by_replies": self.node_scale_by_replies
            },
            "edges": {
                "show_replies": self.edge_show_replies,
                "weight": self.edge_weight
            },
            "viz": {
                "color_by_source": self.viz_color_by_source,
                "show_labels": self.viz_show_labels
            }
        })
    }

    /// Convert to a [`Configuration`]
    pub fn to_configuration(&self) -> Configuration {
        let mut config = Configuration::new();
        if let serde_json::Value::Object(sections) = self.to_value() {
            for (name, section) in sections {
                if let serde_json::Value::Object(entries) = section {
                    for (key, value) in entries {
                        config.set(&name, key, value);
                    }
                }
            }
        }
        config
    }
}
