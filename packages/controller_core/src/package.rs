use serde::Serialize;
use sunshine_api_client::api::ControlHttpClient;

use crate::controller::SunshineController;
use crate::process::{ProcessControl, ProcessError};

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub current_version: Option<String>,
    pub update_version: Option<String>,
}

/// Version from `flatpak info` output; the last `Version:` line wins.
pub fn parse_info_version(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter(|line| line.contains("Version:"))
        .filter_map(|line| line.split_once(':'))
        .map(|(_, version)| version.trim().to_string())
        .last()
        .filter(|version| !version.is_empty())
}

/// Available version from `flatpak remote-ls --columns=application,version`.
pub fn parse_update_version(stdout: &str, app_id: &str) -> Option<String> {
    stdout
        .lines()
        .filter(|line| line.contains(app_id))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|version| version.to_string())
        .last()
}

fn lists_application(stdout: &str, app_id: &str) -> bool {
    stdout.lines().any(|line| line.trim() == app_id)
}

impl<P: ProcessControl, C: ControlHttpClient> SunshineController<P, C> {
    pub async fn is_installed(&self) -> bool {
        match self.process.run("flatpak", &["list", "--system", "--columns=application"]).await {
            Ok(stdout) => lists_application(&stdout, &self.config.app_id),
            Err(error) => {
                tracing::error!(%error, "failed to check whether sunshine is installed");
                false
            }
        }
    }

    pub(crate) async fn install_or_update(&self) -> Result<(), ProcessError> {
        let app_id = self.config.app_id.as_str();
        self.process
            .run("flatpak", &["install", "--system", "--noninteractive", "--or-update", app_id])
            .await?;
        Ok(())
    }

    /// Both lookups are best effort; a failed or unparsable one leaves its
    /// field empty.
    pub async fn version_info(&self) -> VersionInfo {
        let app_id = self.config.app_id.as_str();

        let current_version = self
            .run_logged("getting sunshine version info", "flatpak", &["info", app_id])
            .await
            .and_then(|stdout| parse_info_version(&stdout));

        self.run_logged("refreshing flatpak appstream data", "flatpak", &["update", "--appstream"])
            .await;

        let update_version = self
            .run_logged(
                "checking for sunshine updates",
                "flatpak",
                &["remote-ls", "--app", "--updates", "--system", "--columns=application,version"],
            )
            .await
            .and_then(|stdout| parse_update_version(&stdout, app_id));

        VersionInfo { current_version, update_version }
    }
}
