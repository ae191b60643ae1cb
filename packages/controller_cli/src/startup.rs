use sunshine_api_client::api::ControlHttpClient;
use sunshine_controller_core::process::ProcessControl;
use sunshine_controller_core::SunshineController;

use crate::settings::{RunState, SettingsStore};

/// A service that was never explicitly stopped is started.
pub fn should_start(last: Option<RunState>) -> bool {
    last != Some(RunState::Stop)
}

/// A failed start counts as stopped, so the next boot does not retry it.
pub fn state_after_start(started: bool) -> RunState {
    if started { RunState::Start } else { RunState::Stop }
}

pub fn state_after_stop(stopped: bool) -> RunState {
    if stopped { RunState::Stop } else { RunState::Start }
}

/// Plugin load: provision, restore the token, then start the service unless
/// it was explicitly stopped. A failed start here leaves the stored run
/// state alone so the next load tries again.
pub async fn run<P: ProcessControl, C: ControlHttpClient>(
    controller: &SunshineController<P, C>,
    settings: &mut SettingsStore,
) -> bool {
    tracing::info!(path = %settings.path().display(), settings = ?settings.values(), "loaded settings");

    if let Err(error) = controller.ensure_dependencies().await {
        tracing::error!(%error, "dependencies could not be ensured, aborting startup");
        return false;
    }

    if controller.auth_header().await.is_none() {
        match settings.values().last_auth_header.clone() {
            Some(auth_header) => controller.restore_auth_header(auth_header).await,
            None => tracing::error!("no auth header stored, credentials must be set"),
        }
    }
    persist_auth_header(controller, settings).await;

    if !should_start(settings.values().last_run_state) {
        tracing::info!("sunshine was stopped last time, not starting");
        return true;
    }

    /* only explicit start and stop change the remembered state */
    match controller.start().await {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(%error, "failed to start sunshine on load");
            false
        }
    }
}

pub async fn start<P: ProcessControl, C: ControlHttpClient>(
    controller: &SunshineController<P, C>,
    settings: &mut SettingsStore,
) -> bool {
    let started = match controller.start().await {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(%error, "failed to start sunshine");
            false
        }
    };

    save_run_state(settings, state_after_start(started)).await;
    started
}

pub async fn stop<P: ProcessControl, C: ControlHttpClient>(
    controller: &SunshineController<P, C>,
    settings: &mut SettingsStore,
) -> bool {
    let stopped = match controller.stop().await {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(%error, "failed to stop sunshine");
            false
        }
    };

    save_run_state(settings, state_after_stop(stopped)).await;
    stopped
}

/// Writes the controller's token to settings if it differs from the stored one.
pub async fn persist_auth_header<P: ProcessControl, C: ControlHttpClient>(
    controller: &SunshineController<P, C>,
    settings: &mut SettingsStore,
) {
    let Some(auth_header) = controller.auth_header().await else {
        return;
    };

    if let Err(error) = settings.set_last_auth_header(auth_header).await {
        tracing::error!(%error, "failed to persist auth header");
    }
}

async fn save_run_state(settings: &mut SettingsStore, state: RunState) {
    if let Err(error) = settings.set_last_run_state(state).await {
        tracing::error!(%error, ?state, "failed to persist run state");
    }
}

#[cfg(test)]
mod test {
    use std::os::unix::net::UnixListener;
    use std::sync::Mutex;

    use serde_json::{json, Value};
    use sunshine_api_client::api::{RequestError, RequestResult};
    use sunshine_controller_core::config::{AudioSearchConfig, ControllerConfig, SUNSHINE_APP_ID};
    use sunshine_controller_core::environment::LaunchEnvironment;
    use sunshine_controller_core::process::{ProcessError, SpawnRequest};

    use super::*;
    use crate::settings::PluginSettings;

    const FRAMEBUFFER: &str = r#"{ "/dev/dri/card0": { "crtcs": [{ "id": 81, "fb_id": 142 }] } }"#;
    const NO_FRAMEBUFFER: &str = r#"{ "/dev/dri/card0": { "crtcs": [{ "id": 81, "fb_id": 0 }] } }"#;

    #[derive(Default)]
    struct Host {
        running: bool,
        installed: bool,
        no_display: bool,
        spawns: usize,
    }

    #[derive(Default)]
    struct FakeHost(Mutex<Host>);

    impl FakeHost {
        fn installed() -> Self {
            let host = FakeHost::default();
            host.0.lock().unwrap().installed = true;
            host
        }

        fn without_display(self) -> Self {
            self.0.lock().unwrap().no_display = true;
            self
        }

        fn spawns(&self) -> usize {
            self.0.lock().unwrap().spawns
        }
    }

    impl ProcessControl for FakeHost {
        async fn list_by_name(&self, _name: &str) -> Result<Vec<u32>, ProcessError> {
            Ok(if self.0.lock().unwrap().running { vec![4242] } else { vec![] })
        }

        async fn spawn_detached(&self, _request: &SpawnRequest) -> Result<u32, ProcessError> {
            let mut host = self.0.lock().unwrap();
            host.spawns += 1;
            host.running = true;
            Ok(7000)
        }

        async fn terminate_group(&self, _name: &str, _group: Option<u32>) -> Result<(), ProcessError> {
            self.0.lock().unwrap().running = false;
            Ok(())
        }

        async fn run(&self, program: &str, args: &[&str]) -> Result<String, ProcessError> {
            let mut host = self.0.lock().unwrap();
            let output = match (program, args.first().copied()) {
                ("drm_info", _) if host.no_display => NO_FRAMEBUFFER.to_string(),
                ("drm_info", _) => FRAMEBUFFER.to_string(),
                ("flatpak", Some("list")) if host.installed => format!("{}\n", SUNSHINE_APP_ID),
                ("flatpak", Some("install")) => {
                    host.installed = true;
                    String::new()
                }
                _ => String::new(),
            };
            Ok(output)
        }
    }

    /// Accepts every password change; everything else is unreachable.
    struct AcceptingApi;

    impl ControlHttpClient for AcceptingApi {
        async fn request(&self, path: &str, _auth_header: Option<&str>, _body: Option<&Value>) -> RequestResult {
            match path {
                "/api/password" => RequestResult::Success(json!({ "status": true })),
                _ => RequestResult::Error(RequestError::Unreachable),
            }
        }
    }

    struct Boot {
        dir: tempfile::TempDir,
        _audio: UnixListener,
        controller: SunshineController<FakeHost, AcceptingApi>,
    }

    impl Boot {
        fn new(host: FakeHost) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let runtime = dir.path().join("xdg");
            std::fs::create_dir_all(runtime.join("pulse")).unwrap();
            let audio = UnixListener::bind(runtime.join("pulse/native")).unwrap();
            std::fs::write(dir.path().join("bwrap-src"), b"#!/bin/sh\n").unwrap();

            let config = ControllerConfig {
                runtime_dir: dir.path().join("runtime"),
                helper_source: dir.path().join("bwrap-src"),
                audio: AudioSearchConfig {
                    runtime_hint: Some(runtime),
                    user_runtime_root: dir.path().join("run-user"),
                    temp_root: dir.path().join("tmp"),
                    interactive_user: "no-such-user-for-tests".to_string(),
                    privileged_uid: u32::MAX,
                    fallback_uid: 1000,
                },
                ..Default::default()
            };
            let environment = LaunchEnvironment::with_base(Vec::new(), &config);
            let controller = SunshineController::new(config, host, AcceptingApi, environment);

            Boot { dir, _audio: audio, controller }
        }

        fn settings_path(&self) -> String {
            self.dir.path().join("decky-sunshine.json").to_string_lossy().into_owned()
        }

        async fn settings(&self) -> SettingsStore {
            SettingsStore::load(Some(self.settings_path())).await.unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_install_keeps_generated_token() {
        let boot = Boot::new(FakeHost::default());
        let mut settings = boot.settings().await;

        assert!(run(&boot.controller, &mut settings).await);

        let token = boot.controller.auth_header().await.unwrap();
        assert!(token.starts_with("Basic "));
        let stored = boot.settings().await;
        assert_eq!(stored.values().last_auth_header.as_deref(), Some(token.as_str()));
        assert_eq!(stored.values().last_run_state, None);
        assert_eq!(boot.controller.process().spawns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_token_is_restored_and_service_started() {
        let boot = Boot::new(FakeHost::installed());
        let mut settings = boot.settings().await;
        settings.set_last_auth_header("Basic dTpw".to_string()).await.unwrap();

        assert!(run(&boot.controller, &mut settings).await);

        assert_eq!(boot.controller.auth_header().await.as_deref(), Some("Basic dTpw"));
        assert!(boot.controller.is_running().await);
        assert_eq!(boot.settings().await.values().last_auth_header.as_deref(), Some("Basic dTpw"));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_service_stays_stopped() {
        let boot = Boot::new(FakeHost::installed());
        let mut settings = boot.settings().await;
        settings.set_last_run_state(RunState::Stop).await.unwrap();

        assert!(run(&boot.controller, &mut settings).await);

        assert_eq!(boot.controller.process().spawns(), 0);
        assert_eq!(boot.settings().await.values().last_run_state, Some(RunState::Stop));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dependencies_abort_startup() {
        let boot = Boot::new(FakeHost::default());
        std::fs::remove_file(boot.dir.path().join("bwrap-src")).unwrap();
        let mut settings = boot.settings().await;

        assert!(!run(&boot.controller, &mut settings).await);

        assert_eq!(boot.controller.process().spawns(), 0);
        assert_eq!(boot.settings().await.values(), &PluginSettings::default());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_display_does_not_disable_autostart() {
        let boot = Boot::new(FakeHost::installed().without_display());
        let mut settings = boot.settings().await;
        settings.set_last_run_state(RunState::Start).await.unwrap();

        assert!(!run(&boot.controller, &mut settings).await);

        assert_eq!(boot.controller.process().spawns(), 0);
        assert_eq!(boot.settings().await.values().last_run_state, Some(RunState::Start));
        assert!(should_start(boot.settings().await.values().last_run_state));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_start_and_stop_are_remembered() {
        let boot = Boot::new(FakeHost::installed());
        let mut settings = boot.settings().await;

        assert!(start(&boot.controller, &mut settings).await);
        assert_eq!(boot.settings().await.values().last_run_state, Some(RunState::Start));

        assert!(stop(&boot.controller, &mut settings).await);
        assert_eq!(boot.settings().await.values().last_run_state, Some(RunState::Stop));
    }

    #[test]
    fn starts_unless_stopped_explicitly() {
        assert!(should_start(None));
        assert!(should_start(Some(RunState::Start)));
        assert!(!should_start(Some(RunState::Stop)));
    }

    #[test]
    fn failed_transitions_record_opposite_state() {
        assert_eq!(state_after_start(true), RunState::Start);
        assert_eq!(state_after_start(false), RunState::Stop);
        assert_eq!(state_after_stop(true), RunState::Stop);
        assert_eq!(state_after_stop(false), RunState::Start);
    }
}
