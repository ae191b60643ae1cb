use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use sunshine_controller_core::ControllerConfig;

pub const SETTINGS_DIR_ENV: &str = "DECKY_PLUGIN_SETTINGS_DIR";
pub const SETTINGS_FILE: &str = "decky-sunshine.json";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Start,
    Stop,
}

#[derive(Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_auth_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_state: Option<RunState>,
    /// Keys owned by other parts of the plugin, written back untouched.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl std::fmt::Debug for PluginSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let auth = self
            .last_auth_header
            .as_ref()
            .map(|header| format!("[SET - {} characters]", header.len()));

        f.debug_struct("PluginSettings")
            .field("last_auth_header", &auth)
            .field("last_run_state", &self.last_run_state)
            .field("other", &self.other)
            .finish()
    }
}

/// Key/value settings shared with the plugin host, persisted on every change.
pub struct SettingsStore {
    path: PathBuf,
    values: PluginSettings,
}

impl SettingsStore {
    pub async fn load(path: Option<String>) -> Result<Self, SettingsError> {
        let path = match path {
            Some(v) => PathBuf::from(v),
            None => Self::get_default_path(),
        };

        let values = match tokio::fs::read_to_string(&path).await {
            Ok(data) if data.trim().is_empty() => PluginSettings::default(),
            Ok(data) => serde_json::from_str(&data).map_err(|error| SettingsError::ParseError(error.to_string()))?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no settings file yet");
                PluginSettings::default()
            }
            Err(error) => return Err(SettingsError::IoError(error)),
        };

        Ok(SettingsStore { path, values })
    }

    pub fn get_default_path() -> PathBuf {
        if let Some(dir) = std::env::var_os(SETTINGS_DIR_ENV) {
            return Path::new(&dir).join(SETTINGS_FILE);
        }

        match dirs::config_local_dir() {
            Some(dir) => dir.join("decky-sunshine").join(SETTINGS_FILE),
            None => PathBuf::from(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn values(&self) -> &PluginSettings {
        &self.values
    }

    pub async fn set_last_auth_header(&mut self, auth_header: String) -> Result<(), SettingsError> {
        if self.values.last_auth_header.as_deref() == Some(auth_header.as_str()) {
            return Ok(());
        }
        self.values.last_auth_header = Some(auth_header);
        self.save().await
    }

    pub async fn set_last_run_state(&mut self, state: RunState) -> Result<(), SettingsError> {
        if self.values.last_run_state == Some(state) {
            return Ok(());
        }
        self.values.last_run_state = Some(state);
        self.save().await
    }

    async fn save(&self) -> Result<(), SettingsError> {
        let data = serde_json::to_string_pretty(&self.values).map_err(|error| SettingsError::ParseError(error.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(SettingsError::IoError)?;
        }

        /* replace atomically */
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await.map_err(SettingsError::IoError)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(SettingsError::IoError)?;

        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

pub async fn load_config(path: Option<&str>) -> Result<ControllerConfig, SettingsError> {
    match path {
        Some(path) => filetype_load(path).await,
        None => Ok(ControllerConfig::default()),
    }
}

async fn filetype_load<T: DeserializeOwned>(path: &str) -> Result<T, SettingsError> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(SettingsError::IoError)?;

    if path.ends_with(".toml") {
        return toml::from_str(&data).map_err(|error| SettingsError::ParseError(error.to_string()));
    }

    if path.ends_with(".yaml") || path.ends_with(".yml") {
        return serde_yaml::from_str(&data).map_err(|error| SettingsError::ParseError(error.to_string()));
    }

    serde_json::from_str(&data).map_err(|error| {
        if path.ends_with(".json") {
            SettingsError::ParseError(error.to_string())
        } else {
            SettingsError::UnknownFiletype(path.to_string())
        }
    })
}

#[derive(Debug)]
pub enum SettingsError {
    IoError(std::io::Error),
    ParseError(String),
    UnknownFiletype(String),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::IoError(error) => write!(f, "io error: {}", error),
            SettingsError::ParseError(error) => write!(f, "failed to parse: {}", error),
            SettingsError::UnknownFiletype(path) => write!(f, "unknown file type: {}", path),
        }
    }
}

impl std::error::Error for SettingsError {}
