use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_FILE_NAME: &str = "labscout.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid settings: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub state_root: PathBuf,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub capability: CapabilitySettings,
    #[serde(default)]
    pub snapshot: SnapshotSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapabilitySettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for CapabilitySettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl Settings {
    pub fn resolve_snapshot_path(&self) -> Option<PathBuf> {
        if !self.snapshot.enabled {
            return None;
        }
        Some(
            self.snapshot
                .path
                .clone()
                .unwrap_or_else(|| self.state_root.join("research_snapshot.json")),
        )
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8520".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_api_base() -> String {
    "http://127.0.0.1:8620".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

fn default_api_key_env() -> String {
    "LABSCOUT_API_KEY".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let settings: Settings = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.state_root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "state_root must be non-empty".to_string(),
        ));
    }
    if settings.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "bind_address must be non-empty".to_string(),
        ));
    }
    if settings.workers == 0 {
        return Err(ConfigError::Validation(
            "workers must be at least 1".to_string(),
        ));
    }
    if settings.capability.api_base.trim().is_empty() {
        return Err(ConfigError::Validation(
            "capability.api_base must be non-empty".to_string(),
        ));
    }
    if settings.capability.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "capability.model must be non-empty".to_string(),
        ));
    }
    if settings.capability.api_key_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "capability.api_key_env must be non-empty".to_string(),
        ));
    }
    if settings.capability.timeout_seconds == 0 {
        return Err(ConfigError::Validation(
            "capability.timeout_seconds must be at least 1".to_string(),
        ));
    }
    Ok(())
}
