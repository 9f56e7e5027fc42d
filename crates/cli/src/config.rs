//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tuner_lib::EngineConfig;

/// Environment prefix for engine settings, e.g. `TUNER_THREAD_POOL_MULTIPLIER`
const ENV_PREFIX: &str = "TUNER";

/// Engine settings: optional file first, then `TUNER_*` environment variables
pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        builder = builder.add_source(config::File::from(path.to_path_buf()));
    }
    let settings = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .context("Failed to load engine configuration")?;

    settings
        .try_deserialize()
        .context("Invalid engine configuration")
}

/// Per-user CLI defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserSettings {
    /// Directory of performance profile JSON files
    pub profiles_dir: Option<PathBuf>,
    /// Default output format (`table` or `json`)
    pub default_format: Option<String>,
}

impl UserSettings {
    /// Load settings from the user config dir; missing file means defaults
    pub fn load() -> Result<Self> {
        let Some(path) = Self::settings_path() else {
            return Ok(Self::default());
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read settings file")?;
        serde_json::from_str(&content).context("Failed to parse settings file")
    }

    fn settings_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("runtime-tuner").join("settings.json"))
    }
}
