// crates/datwatch-core/src/config.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::tracker::TrackerOptions;

pub const DEFAULT_INACTIVITY_SECS: u64 = 20;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_EXTENSION: &str = "dat";

pub const ENV_INPUT_DIR: &str = "DATWATCH_INPUT_DIR";
pub const ENV_OUTPUT_DIR: &str = "DATWATCH_OUTPUT_DIR";
pub const ENV_INACTIVITY_SECS: &str = "DATWATCH_INACTIVITY_SECS";
pub const ENV_POLL_SECS: &str = "DATWATCH_POLL_SECS";
pub const ENV_STATE_FILE: &str = "DATWATCH_STATE_FILE";
pub const ENV_LOG_FILE: &str = "DATWATCH_LOG_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", path.display(), source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{}': {}", path.display(), source)]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {key}='{value}' is invalid: {message}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        message: String,
    },
    #[error("missing required setting '{0}'")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One configuration layer. Every field is optional so layers can be merged
/// in precedence order before resolving into a [`WatchConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub inactivity_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub extension: Option<String>,
    pub recursive: Option<bool>,
    pub scan_existing: Option<bool>,
    pub state_file: Option<PathBuf>,
    pub dedupe_by_content: Option<bool>,
    pub log_file: Option<PathBuf>,
}

impl ConfigLayer {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a layer from `DATWATCH_*` variables using `lookup` to read them.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path_var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        Ok(Self {
            input_dir: path_var(ENV_INPUT_DIR),
            output_dir: path_var(ENV_OUTPUT_DIR),
            inactivity_secs: parse_secs(ENV_INACTIVITY_SECS, lookup(ENV_INACTIVITY_SECS))?,
            poll_interval_secs: parse_secs(ENV_POLL_SECS, lookup(ENV_POLL_SECS))?,
            state_file: path_var(ENV_STATE_FILE),
            log_file: path_var(ENV_LOG_FILE),
            ..Self::default()
        })
    }

    /// Overlays `higher` on top of `self`; set fields in `higher` win.
    pub fn merge(self, higher: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            input_dir: higher.input_dir.or(self.input_dir),
            output_dir: higher.output_dir.or(self.output_dir),
            inactivity_secs: higher.inactivity_secs.or(self.inactivity_secs),
            poll_interval_secs: higher.poll_interval_secs.or(self.poll_interval_secs),
            extension: higher.extension.or(self.extension),
            recursive: higher.recursive.or(self.recursive),
            scan_existing: higher.scan_existing.or(self.scan_existing),
            state_file: higher.state_file.or(self.state_file),
            dedupe_by_content: higher.dedupe_by_content.or(self.dedupe_by_content),
            log_file: higher.log_file.or(self.log_file),
        }
    }
}

fn parse_secs(key: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidEnv {
            key,
            value: value.clone(),
            message: err.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub inactivity_secs: u64,
    pub poll_interval_secs: u64,
    pub extension: String,
    pub recursive: bool,
    pub scan_existing: bool,
    pub state_file: Option<PathBuf>,
    pub dedupe_by_content: bool,
    pub log_file: Option<PathBuf>,
}

impl WatchConfig {
    pub fn resolve(layer: ConfigLayer) -> Result<Self, ConfigError> {
        let input_dir = layer.input_dir.ok_or(ConfigError::Missing("input_dir"))?;
        let output_dir = layer.output_dir.ok_or(ConfigError::Missing("output_dir"))?;

        let poll_interval_secs = layer.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }

        let extension = layer
            .extension
            .as_deref()
            .map(|ext| ext.trim().trim_start_matches('.').to_string())
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        if extension.is_empty() {
            return Err(ConfigError::Invalid("extension must not be empty".to_string()));
        }

        Ok(Self {
            input_dir,
            output_dir,
            inactivity_secs: layer.inactivity_secs.unwrap_or(DEFAULT_INACTIVITY_SECS),
            poll_interval_secs,
            extension,
            recursive: layer.recursive.unwrap_or(false),
            scan_existing: layer.scan_existing.unwrap_or(false),
            state_file: layer.state_file,
            dedupe_by_content: layer.dedupe_by_content.unwrap_or(false),
            log_file: layer.log_file,
        })
    }

    pub fn inactivity_period(&self) -> Duration {
        Duration::from_secs(self.inactivity_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn tracker_options(&self) -> TrackerOptions {
        TrackerOptions {
            extension: self.extension.clone(),
            inactivity_period: self.inactivity_period(),
            dedupe_by_content: self.dedupe_by_content,
        }
    }
}
