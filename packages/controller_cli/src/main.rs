use std::fmt::{Display, Formatter};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use sunshine_api_client::http_client::HttpClientError;
use sunshine_controller_core::SystemController;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, CliCommand};
use crate::settings::{load_config, SettingsError, SettingsStore};

pub mod cli;
pub mod logging;
pub mod monitor;
pub mod settings;
pub mod startup;

#[tokio::main]
async fn main() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.log_path.as_deref());

    let config = load_config(cli.config.as_deref()).await?;
    let mut settings = SettingsStore::load(cli.settings_path.clone()).await?;
    let controller = SystemController::create(config)?;

    /* run decides itself whether the stored token is used */
    if !matches!(cli.command, CliCommand::Run) {
        if let Some(auth_header) = settings.values().last_auth_header.clone() {
            controller.restore_auth_header(auth_header).await;
        }
    }

    let ok = match cli.command {
        CliCommand::Version => output(env!("CARGO_PKG_VERSION")),
        CliCommand::Run => output(startup::run(&controller, &mut settings).await),
        CliCommand::Start => output(startup::start(&controller, &mut settings).await),
        CliCommand::Stop => output(startup::stop(&controller, &mut settings).await),
        CliCommand::Status => {
            output(controller.is_running().await);
            true
        }
        CliCommand::Pair { pin, client_name } => {
            let res = controller.pair(&pin, &client_name).await;
            if let Err(error) = &res {
                tracing::error!(%error, "pairing failed");
            }
            output(res.is_ok())
        }
        CliCommand::SetCredentials { username, password } => {
            let res = controller.set_credentials(&username, &password).await;
            startup::persist_auth_header(&controller, &mut settings).await;
            output(res.is_ok())
        }
        CliCommand::ChangeCredentials { username, password } => {
            let res = controller.change_credentials(&username, &password).await;
            if let Err(error) = &res {
                tracing::error!(%error, "changing credentials failed");
            }
            startup::persist_auth_header(&controller, &mut settings).await;
            output(res.is_ok())
        }
        CliCommand::GetCredentials => {
            output(controller.get_credentials().await);
            true
        }
        CliCommand::CredentialsValid => {
            output(controller.are_credentials_valid().await);
            true
        }
        CliCommand::EnsureDependencies => {
            let res = controller.ensure_dependencies().await;
            if let Err(error) = &res {
                tracing::error!(%error, "ensuring dependencies failed");
            }
            startup::persist_auth_header(&controller, &mut settings).await;
            output(res.is_ok())
        }
        CliCommand::Update => {
            let res = controller.update_sunshine().await;
            if let Err(error) = &res {
                tracing::error!(%error, "update failed");
            }
            output(res.is_ok())
        }
        CliCommand::VersionInfo => {
            output(controller.version_info().await);
            true
        }
        CliCommand::Monitor { interval } => {
            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
            monitor::run_monitor(&controller, Duration::from_secs(interval.max(1)), cancel).await;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Prints `value` as JSON on stdout. Returns it unchanged when it is a bool
/// so operation results double as exit status.
fn output<T: Serialize + OutputStatus>(value: T) -> bool {
    match serde_json::to_string(&value) {
        Ok(json) => println!("{}", json),
        Err(error) => tracing::error!(?error, "failed to serialize output"),
    }
    value.status()
}

trait OutputStatus {
    fn status(&self) -> bool {
        true
    }
}

impl OutputStatus for bool {
    fn status(&self) -> bool {
        *self
    }
}

impl OutputStatus for &str {}
impl<T> OutputStatus for Option<T> {}
impl OutputStatus for sunshine_controller_core::VersionInfo {}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(?error, "cannot listen for ctrl_c");
        return;
    }
    tracing::info!("received Ctrl+C signal");
    cancel.cancel();
}

#[derive(Debug)]
pub enum CliError {
    Settings(SettingsError),
    HttpClient(HttpClientError),
}

impl std::error::Error for CliError {}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Settings(error) => write!(f, "settings: {}", error),
            CliError::HttpClient(error) => write!(f, "http client: {}", error),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(e: SettingsError) -> Self {
        CliError::Settings(e)
    }
}

impl From<HttpClientError> for CliError {
    fn from(e: HttpClientError) -> Self {
        CliError::HttpClient(e)
    }
}
