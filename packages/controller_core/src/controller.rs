use sunshine_api_client::api::{ControlHttpClient, SunshineApiClient};
use sunshine_api_client::http_client::{HttpClient, HttpClientError};
use tokio::sync::Mutex;

use crate::config::ControllerConfig;
use crate::environment::LaunchEnvironment;
use crate::process::{ProcessControl, SystemProcessControl};

/// Owns everything the controller mutates: the active token (inside the api
/// client), the launch environment and the launcher's process group.
///
/// Mutating operations (start, stop, update, install) must be serialized by
/// the caller.
pub struct SunshineController<P: ProcessControl, C: ControlHttpClient> {
    pub(crate) config: ControllerConfig,
    pub(crate) process: P,
    pub(crate) api: SunshineApiClient<C>,
    pub(crate) environment: Mutex<LaunchEnvironment>,
    pub(crate) launcher_group: Mutex<Option<u32>>,
}

pub type SystemController = SunshineController<SystemProcessControl, HttpClient>;

impl SystemController {
    pub fn create(config: ControllerConfig) -> Result<Self, HttpClientError> {
        let client = HttpClient::new(config.api_base.clone(), config.request_timeout())?;
        let environment = LaunchEnvironment::from_process(&config);
        Ok(SunshineController::new(config, SystemProcessControl, client, environment))
    }
}

impl<P: ProcessControl, C: ControlHttpClient> SunshineController<P, C> {
    pub fn new(config: ControllerConfig, process: P, client: C, environment: LaunchEnvironment) -> Self {
        SunshineController {
            config,
            process,
            api: SunshineApiClient::new(client),
            environment: Mutex::new(environment),
            launcher_group: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    pub fn api(&self) -> &SunshineApiClient<C> {
        &self.api
    }

    pub async fn environment(&self) -> LaunchEnvironment {
        self.environment.lock().await.clone()
    }

    /// Runs a helper command, logging instead of propagating failures.
    pub(crate) async fn run_logged(&self, context: &'static str, program: &str, args: &[&str]) -> Option<String> {
        match self.process.run(program, args).await {
            Ok(stdout) => Some(stdout),
            Err(error) => {
                tracing::error!(%error, context, "command failed");
                None
            }
        }
    }
}
