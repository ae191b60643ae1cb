use std::ops::ControlFlow;

use sunshine_api_client::api::ControlHttpClient;

use crate::controller::SunshineController;
use crate::error::{StartError, StopError};
use crate::process::{ProcessControl, ProcessError, SpawnRequest};
use crate::retry::{describe_wait, RetryPolicy};

impl<P: ProcessControl, C: ControlHttpClient> SunshineController<P, C> {
    pub async fn is_running(&self) -> bool {
        match self.process.list_by_name(&self.config.app_id).await {
            Ok(pids) => !pids.is_empty(),
            Err(error) => {
                tracing::error!(%error, "failed to check whether sunshine is running");
                false
            }
        }
    }

    pub async fn start(&self) -> Result<(), StartError> {
        if self.is_running().await {
            tracing::info!("sunshine already running");
            return Ok(());
        }

        self.wait_until_ready().await?;

        self.elevate_helper().await.map_err(|error| {
            tracing::error!(%error, "failed to set permissions on sandbox helper");
            StartError::HelperPermissions(error)
        })?;

        let request = self.launch_request().await;
        let group = self.process.spawn_detached(&request).await.map_err(|error| {
            tracing::error!(%error, "an error occurred when starting sunshine");
            StartError::Spawn(error)
        })?;
        *self.launcher_group.lock().await = Some(group);
        tracing::info!(group, "sunshine launcher spawned");

        if !self.wait_for_process(true).await {
            tracing::error!("aborting wait for sunshine process to start");
            self.abandon_launch(group).await;
            return Err(StartError::NotRunningAfterSpawn);
        }

        tracing::info!("sunshine started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), StopError> {
        if !self.is_running().await {
            return Ok(());
        }

        let group = self.launcher_group.lock().await.take();
        if let Err(error) = self.process.terminate_group(&self.config.app_id, group).await {
            tracing::error!(%error, "failed to kill sunshine");
        }

        if !self.wait_for_process(false).await {
            tracing::error!("aborting wait for sunshine process to end");
            let mut lock = self.launcher_group.lock().await;
            if lock.is_none() {
                *lock = group;
            }
            return Err(StopError::StillRunning);
        }

        tracing::info!("sunshine stopped");
        Ok(())
    }

    /// A launcher that never produced the service is killed so it cannot
    /// come up after start already reported failure.
    async fn abandon_launch(&self, group: u32) {
        self.launcher_group.lock().await.take();
        if let Err(error) = self.process.terminate_group(&self.config.app_id, Some(group)).await {
            tracing::error!(%error, group, "failed to kill sunshine launcher");
        }
    }

    /// Without a display the service cannot capture anything, so that is
    /// fatal. Missing audio only degrades the stream.
    async fn wait_until_ready(&self) -> Result<(), StartError> {
        let policy = RetryPolicy::READINESS;

        let res = policy
            .run(|attempt| async move {
                let display = self.is_display_available().await;
                let audio = self.is_audio_available().await;

                if display && audio {
                    return ControlFlow::Break(());
                }

                if !policy.is_final(attempt) {
                    let wait = describe_wait(policy.interval);
                    if !display {
                        tracing::info!("no display available yet, checking again in {}", wait);
                    }
                    if !audio {
                        tracing::info!("audio subsystem not available yet, checking again in {}", wait);
                    }
                }

                ControlFlow::Continue(display)
            })
            .await;

        match res {
            Ok(()) => {
                tracing::info!("display and audio subsystem available");
                Ok(())
            }
            Err(true) => {
                tracing::warn!("audio subsystem not available after waiting, starting sunshine anyway");
                Ok(())
            }
            Err(false) => {
                tracing::error!("aborting wait for display");
                Err(StartError::DisplayUnavailable)
            }
        }
    }

    /// The sandbox helper needs setuid root to build its namespace.
    async fn elevate_helper(&self) -> Result<(), ProcessError> {
        let helper = self.config.helper_path();
        let helper = helper.to_string_lossy();

        self.process.run("chown", &["0:0", &helper]).await?;
        self.process.run("chmod", &["u+s", &helper]).await?;
        Ok(())
    }

    pub(crate) async fn launch_request(&self) -> SpawnRequest {
        SpawnRequest {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("flatpak run --socket=wayland {}", self.config.app_id),
            ],
            env: self.environment.lock().await.vars().clone(),
        }
    }

    /// Polls until the running state equals `running`.
    async fn wait_for_process(&self, running: bool) -> bool {
        let policy = RetryPolicy::PROCESS_STATE;

        policy
            .run(|attempt| async move {
                if self.is_running().await == running {
                    return ControlFlow::Break(());
                }

                if !policy.is_final(attempt) {
                    let wait = describe_wait(policy.interval);
                    if running {
                        tracing::info!("sunshine process not found yet, checking again in {}", wait);
                    } else {
                        tracing::info!("sunshine process not ended yet, checking again in {}", wait);
                    }
                }

                ControlFlow::Continue(())
            })
            .await
            .is_ok()
    }
}
