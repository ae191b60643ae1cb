use std::collections::HashMap;

use crate::config::ControllerConfig;

pub const PULSE_SERVER: &str = "PULSE_SERVER";
pub const DISPLAY: &str = "DISPLAY";
pub const FLATPAK_BWRAP: &str = "FLATPAK_BWRAP";
pub const LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";

/// Environment handed to the launched service. Built once from the
/// controller's own environment; the audio socket is refreshed by every
/// readiness check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchEnvironment {
    vars: HashMap<String, String>,
}

impl LaunchEnvironment {
    pub fn from_process(config: &ControllerConfig) -> Self {
        let base = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        Self::with_base(base, config)
    }

    pub fn with_base<I: IntoIterator<Item = (String, String)>>(base: I, config: &ControllerConfig) -> Self {
        let mut vars: HashMap<String, String> = base.into_iter().collect();

        let library_path = vars.get(LD_LIBRARY_PATH).cloned().unwrap_or_default();
        vars.insert(LD_LIBRARY_PATH.to_string(), format!("/usr/lib/:{}", library_path));
        vars.insert(DISPLAY.to_string(), config.display.clone());
        vars.insert(
            FLATPAK_BWRAP.to_string(),
            config.helper_path().to_string_lossy().into_owned(),
        );

        LaunchEnvironment { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|v| v.as_str())
    }

    pub fn pulse_server(&self) -> Option<&str> {
        self.get(PULSE_SERVER)
    }

    /// Returns true if the value changed.
    pub fn set_pulse_server(&mut self, uri: String) -> bool {
        if self.pulse_server() == Some(uri.as_str()) {
            return false;
        }
        self.vars.insert(PULSE_SERVER.to_string(), uri);
        true
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }
}
