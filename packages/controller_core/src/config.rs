use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sunshine_api_client::{DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT};

pub const SUNSHINE_APP_ID: &str = "dev.lizardbyte.app.Sunshine";
pub const RUNTIME_DIR_ENV: &str = "DECKY_PLUGIN_RUNTIME_DIR";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Flatpak application id of the service.
    pub app_id: String,
    pub api_base: String,
    pub request_timeout_ms: u64,
    /// Directory owned by the controller; holds the private bwrap copy.
    pub runtime_dir: PathBuf,
    pub helper_source: PathBuf,
    pub display: String,
    pub audio: AudioSearchConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            app_id: SUNSHINE_APP_ID.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            runtime_dir: default_runtime_dir(),
            helper_source: PathBuf::from("/usr/bin/bwrap"),
            display: ":0".to_string(),
            audio: AudioSearchConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn helper_path(&self) -> PathBuf {
        self.runtime_dir.join("bwrap")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_runtime_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(RUNTIME_DIR_ENV) {
        return PathBuf::from(dir);
    }

    match dirs::data_local_dir() {
        Some(dir) => dir.join("decky-sunshine"),
        None => std::env::temp_dir().join("decky-sunshine"),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AudioSearchConfig {
    /// `XDG_RUNTIME_DIR` of the controller, checked first.
    pub runtime_hint: Option<PathBuf>,
    pub user_runtime_root: PathBuf,
    pub temp_root: PathBuf,
    /// Account whose runtime dir is preferred over the wildcard scan.
    pub interactive_user: String,
    /// Sockets owned by this uid are never used.
    pub privileged_uid: u32,
    /// uid used for the default socket path when the interactive user is unknown.
    pub fallback_uid: u32,
}

impl Default for AudioSearchConfig {
    fn default() -> Self {
        AudioSearchConfig {
            runtime_hint: std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from),
            user_runtime_root: PathBuf::from("/run/user"),
            temp_root: PathBuf::from("/tmp"),
            interactive_user: "deck".to_string(),
            privileged_uid: 0,
            fallback_uid: 1000,
        }
    }
}
