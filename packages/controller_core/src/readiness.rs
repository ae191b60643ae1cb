use std::collections::HashMap;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::unistd::User;
use serde::Deserialize;
use sunshine_api_client::api::ControlHttpClient;
use tokio::net::UnixStream;

use crate::config::AudioSearchConfig;
use crate::controller::SunshineController;
use crate::process::ProcessControl;

pub const AUDIO_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

const PULSE_NATIVE: &str = "pulse/native";
const PIPEWIRE: &str = "pipewire-0";

#[derive(Deserialize)]
struct DrmCard {
    /* drm_info reports null for cards without modesetting */
    #[serde(default)]
    crtcs: Option<Vec<DrmCrtc>>,
}

#[derive(Deserialize)]
struct DrmCrtc {
    #[serde(default)]
    fb_id: Option<u64>,
}

/// True if any CRTC of any card in `drm_info -j` output has a framebuffer.
/// Until the compositor attaches one the service finds no display.
pub fn has_attached_framebuffer(drm_info_json: &str) -> bool {
    let cards: HashMap<String, DrmCard> = match serde_json::from_str(drm_info_json) {
        Ok(v) => v,
        Err(error) => {
            tracing::error!(?error, "failed to parse drm_info output");
            return false;
        }
    };

    cards
        .values()
        .flat_map(|card| card.crtcs.as_deref().unwrap_or_default())
        .any(|crtc| crtc.fb_id.unwrap_or_default() != 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSocket {
    pub path: PathBuf,
    /// The socket accepted a connection.
    pub live: bool,
}

impl AudioSocket {
    pub fn uri(&self) -> String {
        format!("unix:{}", self.path.display())
    }
}

/// getpwnam may read files or ask nss, so it runs off the async workers.
async fn lookup_uid(name: &str) -> Option<u32> {
    let owned = name.to_string();
    let res = match tokio::task::spawn_blocking(move || User::from_name(&owned)).await {
        Ok(v) => v,
        Err(error) => {
            tracing::error!(?error, user = name, "user lookup task failed");
            return None;
        }
    };

    match res {
        Ok(user) => user.map(|user| user.uid.as_raw()),
        Err(error) => {
            tracing::warn!(?error, user = name, "failed to look up user");
            None
        }
    }
}

/// Sorted sub directories of `root`, empty if it cannot be read.
async fn list_dirs(root: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    let Ok(mut entries) = tokio::fs::read_dir(root).await else {
        return dirs;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            dirs.push(entry.path());
        }
    }

    dirs.sort();
    dirs
}

/// Socket paths in search order. Paths may not exist.
pub async fn audio_candidates(audio: &AudioSearchConfig, interactive_uid: Option<u32>) -> Vec<PathBuf> {
    let privileged_dir = audio.user_runtime_root.join(audio.privileged_uid.to_string());
    let mut candidates = Vec::new();

    if let Some(hint) = &audio.runtime_hint {
        if !hint.starts_with(&privileged_dir) {
            candidates.push(hint.join(PULSE_NATIVE));
            candidates.push(hint.join(PIPEWIRE));
        }
    }

    if let Some(uid) = interactive_uid {
        let dir = audio.user_runtime_root.join(uid.to_string());
        candidates.push(dir.join(PULSE_NATIVE));
        candidates.push(dir.join(PIPEWIRE));
    }

    let user_dirs = list_dirs(&audio.user_runtime_root, "").await;
    candidates.extend(user_dirs.iter().map(|dir| dir.join(PULSE_NATIVE)));
    candidates.extend(user_dirs.iter().map(|dir| dir.join(PIPEWIRE)));

    let temp_dirs = list_dirs(&audio.temp_root, "pulse-").await;
    candidates.extend(temp_dirs.iter().map(|dir| dir.join("native")));

    candidates
}

async fn accepts_connection(path: &Path) -> bool {
    match tokio::time::timeout(AUDIO_CONNECT_TIMEOUT, UnixStream::connect(path)).await {
        Ok(Ok(_)) => true,
        Ok(Err(error)) => {
            tracing::debug!(?error, path = %path.display(), "cannot connect to audio socket");
            false
        }
        Err(_) => {
            tracing::debug!(path = %path.display(), "timed out connecting to audio socket");
            false
        }
    }
}

/// Picks the first candidate that accepts a connection. Without one, falls
/// back to the first existing candidate, then to the interactive user's
/// default path; both fallbacks are reported as not live.
pub async fn find_audio_socket(audio: &AudioSearchConfig) -> AudioSocket {
    let interactive_uid = lookup_uid(&audio.interactive_user).await;
    let privileged_dir = audio.user_runtime_root.join(audio.privileged_uid.to_string());
    let mut first_existing = None;

    for path in audio_candidates(audio, interactive_uid).await {
        let Ok(meta) = tokio::fs::metadata(&path).await else {
            continue;
        };

        if path.starts_with(&privileged_dir) || meta.uid() == audio.privileged_uid {
            tracing::debug!(path = %path.display(), "skipping privileged audio socket");
            continue;
        }

        if accepts_connection(&path).await {
            tracing::info!(path = %path.display(), "found audio socket");
            return AudioSocket { path, live: true };
        }

        if first_existing.is_none() {
            first_existing = Some(path);
        }
    }

    if let Some(path) = first_existing {
        tracing::warn!(path = %path.display(), "audio socket exists but does not accept connections");
        return AudioSocket { path, live: false };
    }

    let uid = interactive_uid.unwrap_or(audio.fallback_uid);
    let path = audio.user_runtime_root.join(uid.to_string()).join(PULSE_NATIVE);
    tracing::warn!(path = %path.display(), "no audio socket found, using default");
    AudioSocket { path, live: false }
}

impl<P: ProcessControl, C: ControlHttpClient> SunshineController<P, C> {
    pub async fn is_display_available(&self) -> bool {
        let Some(stdout) = self.run_logged("checking for available display", "drm_info", &["-j"]).await else {
            return false;
        };
        has_attached_framebuffer(&stdout)
    }

    /// Searches the audio socket again on every call; it may appear late
    /// during boot. The launch environment always follows the result.
    pub async fn is_audio_available(&self) -> bool {
        let socket = find_audio_socket(&self.config.audio).await;
        let uri = socket.uri();

        if self.environment.lock().await.set_pulse_server(uri.clone()) {
            tracing::info!(pulse_server = %uri, "updated audio socket");
        }

        socket.live
    }
}
