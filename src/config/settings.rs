//! Loader settings file (`comex.toml`)
//!
//! Settings configure the loader itself: where the example catalog lives,
//! which example is the fallback, whether an empty source list still
//! produces a ready signal, and extra graph defaults layered over the
//! built-in ones.
//!
//! ```toml
//! catalog = "examples.toml"
//! fallback_example = 2
//! ready_on_empty = false
//!
//! [defaults.layout]
//! iterations = 500
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::defaults::GraphDefaults;
use super::graph::Configuration;

/// Default settings file name, looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "comex.toml";

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file {path} is not valid UTF-8: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("Failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid graph defaults: {0}")]
    InvalidDefaults(String),
}

/// Where a settings file came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsSource {
    /// File path
    pub path: String,

    /// SHA-256 digest of the raw file bytes
    pub digest: String,
}

/// Parsed settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Path to an example catalog TOML file (built-in catalog if unset)
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// Override the catalog's fallback example index
    #[serde(default)]
    pub fallback_example: Option<usize>,

    /// Fire the ready signal even when no sources resolve
    #[serde(default)]
    pub ready_on_empty: bool,

    /// Extra graph defaults, `[defaults.<section>]` tables
    #[serde(default)]
    pub defaults: Option<toml::Table>,

    /// Provenance of the file these settings were read from
    #[serde(skip)]
    pub source: Option<SettingsSource>,
}

impl LoaderSettings {
    /// Load settings from `path`.
    ///
    /// Relative `catalog` paths are resolved against the settings file's
    /// directory.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let bytes = fs::read(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes).map_err(|source| SettingsError::Encoding {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::parse(&contents)?;

        if let (Some(catalog), Some(dir)) = (settings.catalog.as_mut(), path.parent()) {
            if catalog.is_relative() {
                *catalog = dir.join(&*catalog);
            }
        }

        debug!(path = %path.display(), %digest, "loaded settings");
        settings.source = Some(SettingsSource {
            path: path.to_string_lossy().to_string(),
            digest,
        });
        Ok(settings)
    }

    /// Load settings from `path` if it exists, otherwise return defaults
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse settings from a TOML string
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// Built-in graph defaults with the settings' `[defaults]` layered on top.
    ///
    /// Each `[defaults.<section>]` table sets keys in that section; keys it
    /// does not name keep their built-in value.
    pub fn base_configuration(&self) -> Result<Configuration, SettingsError> {
        let mut config = GraphDefaults::default().to_configuration();
        let Some(defaults) = &self.defaults else {
            return Ok(config);
        };

        for (section, table) in defaults {
            let toml::Value::Table(table) = table else {
                return Err(SettingsError::InvalidDefaults(format!(
                    "[defaults.{}] must be a table",
                    section
                )));
            };
            for (key, value) in table {
                config.set(section, key.as_str(), default_value(value)?);
            }
        }
        Ok(config)
    }
}

// TOML datetimes have no JSON form; keep them as their TOML text.
fn default_value(value: &toml::Value) -> Result<Value, SettingsError> {
    match value {
        toml::Value::Datetime(dt) => Ok(Value::String(dt.to_string())),
        other => serde_json::to_value(other).map_err(|e| SettingsError::InvalidDefaults(e.to_string())),
    }
}
