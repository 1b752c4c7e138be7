//! Settings file management

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::BuilderError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::storage::layout::{DataLayout, DEFAULT_LOCAL_DATA_PATH, DEFAULT_SHARE_DATA_PATH};

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/paas-builder/settings.json";

/// Builder settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Root of the shared data volume
    #[serde(default = "default_share_data_path")]
    pub share_data_path: PathBuf,

    /// Root of the node-local data volume
    #[serde(default = "default_local_data_path")]
    pub local_data_path: PathBuf,

    /// Region API used for rolling upgrades
    #[serde(default)]
    pub region_api: RegionApiSettings,

    /// Identity every fetched artifact is handed to
    #[serde(default)]
    pub artifact_owner: ArtifactOwner,

    /// Upper bound on tasks executing at once
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

fn default_share_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_SHARE_DATA_PATH)
}

fn default_local_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOCAL_DATA_PATH)
}

fn default_max_concurrent_tasks() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            share_data_path: default_share_data_path(),
            local_data_path: default_local_data_path(),
            region_api: RegionApiSettings::default(),
            artifact_owner: ArtifactOwner::default(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

impl Settings {
    /// Load settings from `file`, falling back to defaults when it is absent,
    /// then apply environment overrides.
    pub async fn load(file: &File) -> Result<Self, BuilderError> {
        let settings = if file.exists().await {
            info!("Loading settings from {}", file.path().display());
            file.read_json::<Settings>().await?
        } else {
            debug!("No settings file at {}, using defaults", file.path().display());
            Settings::default()
        };
        Ok(settings.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply `SHARE_DATA_PATH` and `LOCAL_DATA_PATH` when set and non-empty
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SHARE_DATA_PATH").filter(|p| !p.is_empty()) {
            self.share_data_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("LOCAL_DATA_PATH").filter(|p| !p.is_empty()) {
            self.local_data_path = PathBuf::from(path);
        }
        self
    }

    /// Data layout described by these settings
    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.share_data_path, &self.local_data_path)
    }
}

/// Region API settings
#[derive(Debug, Clone, Deserialize)]
pub struct RegionApiSettings {
    /// Base URL of the region API
    #[serde(default = "default_region_api_url")]
    pub base_url: String,

    /// Optional bearer token
    #[serde(default)]
    pub token: Option<SecretString>,
}

fn default_region_api_url() -> String {
    "http://127.0.0.1:8888".to_string()
}

impl Default for RegionApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_region_api_url(),
            token: None,
        }
    }
}

/// Owning uid/gid applied to fetched artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ArtifactOwner {
    pub uid: u32,
    pub gid: u32,
}

impl Default for ArtifactOwner {
    fn default() -> Self {
        Self { uid: 200, gid: 200 }
    }
}
