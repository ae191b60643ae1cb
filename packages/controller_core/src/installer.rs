use std::ops::ControlFlow;

use sunshine_api_client::api::{ControlHttpClient, ReqPassword};

use crate::controller::SunshineController;
use crate::credentials::{generate_password, INITIAL_USERNAME};
use crate::error::{CredentialsError, DependencyError, UpdateError};
use crate::process::ProcessControl;
use crate::retry::{describe_wait, RetryPolicy};

impl<P: ProcessControl, C: ControlHttpClient> SunshineController<P, C> {
    /// Provisions the private sandbox helper and the package, each only if
    /// missing. A fresh install is started and given initial credentials.
    /// Failures are not retried.
    pub async fn ensure_dependencies(&self) -> Result<(), DependencyError> {
        self.ensure_helper().await?;

        if self.is_installed().await {
            tracing::info!("sunshine already installed");
            return Ok(());
        }

        tracing::info!("sunshine not installed, installing");
        self.install_or_update().await.map_err(|error| {
            tracing::error!(%error, "sunshine could not be installed");
            DependencyError::Install(error)
        })?;
        tracing::info!("sunshine was installed successfully");

        self.initialize().await
    }

    async fn ensure_helper(&self) -> Result<(), DependencyError> {
        let helper = self.config.helper_path();

        if tokio::fs::metadata(&helper).await.map(|meta| meta.is_file()).unwrap_or(false) {
            tracing::info!(path = %helper.display(), "sandbox helper already present");
            return Ok(());
        }

        tracing::info!(path = %helper.display(), "sandbox helper missing, copying");

        let copy = async {
            if let Some(parent) = helper.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&self.config.helper_source, &helper).await
        };

        match copy.await {
            Ok(_) => {
                tracing::info!(path = %helper.display(), "sandbox helper copied");
                Ok(())
            }
            Err(error) => {
                tracing::error!(?error, source = %self.config.helper_source.display(), "sandbox helper could not be copied");
                Err(DependencyError::Helper(error))
            }
        }
    }

    async fn initialize(&self) -> Result<(), DependencyError> {
        tracing::info!("starting sunshine after fresh installation");
        self.start().await.map_err(|error| {
            tracing::error!(%error, "sunshine could not be started after installation");
            DependencyError::Start(error)
        })?;

        tracing::info!("setting initial credentials");
        let password = generate_password();
        let req = ReqPassword::new(INITIAL_USERNAME, &password);
        let req = &req;
        let policy = RetryPolicy::INITIAL_CREDENTIALS;

        /* the control api needs a moment after launch; only an explicit refusal stops early */
        let res = policy
            .run(|attempt| async move {
                match self.set_user(req).await {
                    Ok(()) => ControlFlow::Break(Ok(())),
                    Err(CredentialsError::Rejected) => ControlFlow::Break(Err(CredentialsError::Rejected)),
                    Err(error) => {
                        if !policy.is_final(attempt) {
                            tracing::info!(%error, "setting initial credentials failed, trying again in {}", describe_wait(policy.interval));
                        }
                        ControlFlow::Continue(error)
                    }
                }
            })
            .await;

        match res {
            Ok(Ok(())) => {
                tracing::info!(username = INITIAL_USERNAME, "initial credentials set");
                Ok(())
            }
            Ok(Err(error)) => {
                tracing::error!("setting initial credentials failed");
                Err(DependencyError::InitialCredentials(error))
            }
            Err(_) => {
                tracing::error!("initial credentials could not be set");
                Err(DependencyError::InitialCredentials(CredentialsError::NoResponse))
            }
        }
    }

    /// Stop, update, start. A failing stage ends the update with the service
    /// stopped; a launch that never came up is killed by `start`.
    pub async fn update_sunshine(&self) -> Result<(), UpdateError> {
        self.stop().await.map_err(|error| {
            tracing::error!(%error, "couldn't stop sunshine for update");
            UpdateError::Stop(error)
        })?;
        tracing::info!("sunshine stopped for update, installing update");

        self.install_or_update().await.map_err(|error| {
            tracing::error!(%error, "couldn't update sunshine");
            UpdateError::Install(error)
        })?;
        tracing::info!("sunshine updated, starting");

        self.start().await.map_err(|error| {
            tracing::error!(%error, "couldn't start sunshine after update");
            UpdateError::Start(error)
        })?;

        tracing::info!("sunshine started after update");
        Ok(())
    }
}
