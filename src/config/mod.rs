//! Graph configuration
//!
//! The effective graph configuration is built in layers:
//! 1. Built-in graph defaults
//! 2. `[defaults]` tables from the settings file (set key by key)
//! 3. Override fragments from share state or from the selected example
//!    (applied key by key, last write wins)

mod defaults;
mod fragment;
mod graph;
mod merge;
mod settings;

pub use defaults::GraphDefaults;
pub use fragment::{fragments_from_config, MergeError, OverrideFragment, FRAGMENT_SEPARATOR};
pub use graph::Configuration;
pub use merge::merge_overrides;
pub use settings::{LoaderSettings, SettingsError, SettingsSource, DEFAULT_SETTINGS_FILE};
