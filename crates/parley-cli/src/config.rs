//! CLI configuration.
//!
//! Settings are layered: an optional JSON file first, then anything given on
//! the command line or through `PARLEY_*` environment variables.

use std::path::{Path, PathBuf};

use parley_engine::AssistantSettings;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("Failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The settings file is not valid JSON.
    #[error("Failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Resolved CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Assistant settings after all layers are applied.
    pub settings: AssistantSettings,
}

impl Config {
    /// Load `path` (if given) and apply `overrides` on top.
    pub fn load(path: Option<&Path>, overrides: AssistantSettings) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::read_file(path)?,
            None => AssistantSettings::default(),
        };

        Ok(Self {
            settings: base.merge(overrides),
        })
    }

    fn read_file(path: &Path) -> Result<AssistantSettings, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        AssistantSettings::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
