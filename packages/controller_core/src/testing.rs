use std::collections::{HashMap, VecDeque};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use nix::unistd::getuid;
use serde_json::Value;
use sunshine_api_client::api::{ControlHttpClient, RequestError, RequestResult};
use tokio::time::Instant;

use crate::config::{AudioSearchConfig, ControllerConfig, SUNSHINE_APP_ID};
use crate::controller::SunshineController;
use crate::environment::LaunchEnvironment;
use crate::process::{ProcessControl, ProcessError, SpawnRequest};

pub const ATTACHED_FRAMEBUFFER: &str = r#"{ "/dev/dri/card0": { "crtcs": [{ "id": 80, "fb_id": 0 }, { "id": 81, "fb_id": 142 }] } }"#;
pub const NO_FRAMEBUFFER: &str = r#"{ "/dev/dri/card0": { "crtcs": [{ "id": 80, "fb_id": 0 }, { "id": 81, "fb_id": 0 }] } }"#;

pub const FAKE_PID: u32 = 4242;

pub type TestController = SunshineController<FakeProcessControl, FakeHttpClient>;

pub fn assert_waited(started: Instant, expected: Duration) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "waited {:?}, expected {:?}", elapsed, expected
    );
}

/// Temp dir holding the runtime dir, the helper source and a live audio socket.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    _audio: Option<UnixListener>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("run-user/1000/pulse/native");
        std::fs::create_dir_all(socket.parent().unwrap()).unwrap();
        std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
        std::fs::write(dir.path().join("bwrap-src"), b"#!/bin/sh\n").unwrap();
        let audio = UnixListener::bind(&socket).unwrap();

        Fixture { dir, _audio: Some(audio) }
    }

    pub fn audio_socket(&self) -> PathBuf {
        self.dir.path().join("run-user/1000/pulse/native")
    }

    /// Removes the audio socket entirely.
    pub fn silence_audio(&mut self) {
        self._audio = None;
        let _ = std::fs::remove_file(self.audio_socket());
    }

    pub fn config(&self) -> ControllerConfig {
        test_config(self.dir.path())
    }
}

pub fn test_config(root: &Path) -> ControllerConfig {
    ControllerConfig {
        runtime_dir: root.join("runtime"),
        helper_source: root.join("bwrap-src"),
        audio: AudioSearchConfig {
            runtime_hint: None,
            user_runtime_root: root.join("run-user"),
            temp_root: root.join("tmp"),
            interactive_user: "no-such-user-for-tests".to_string(),
            privileged_uid: getuid().as_raw().wrapping_add(1),
            fallback_uid: 1000,
        },
        ..Default::default()
    }
}

pub fn controller(process: FakeProcessControl, http: FakeHttpClient) -> (TestController, Fixture) {
    let fixture = Fixture::new();
    let config = fixture.config();
    (build(config, process, http), fixture)
}

/// Uses `config` as given; the fixture is still created but not referenced.
pub fn controller_with(config: ControllerConfig, process: FakeProcessControl, http: FakeHttpClient) -> (TestController, Fixture) {
    (build(config, process, http), Fixture::new())
}

fn build(config: ControllerConfig, process: FakeProcessControl, http: FakeHttpClient) -> TestController {
    let base = vec![
        ("PATH".to_string(), "/usr/bin:/bin".to_string()),
        ("LD_LIBRARY_PATH".to_string(), "/plugin/lib".to_string()),
    ];
    let environment = LaunchEnvironment::with_base(base, &config);
    SunshineController::new(config, process, http, environment)
}

#[derive(Default)]
struct FakeState {
    running: bool,
    installed: bool,
    display: VecDeque<String>,
    outputs: Vec<(String, String)>,
    failing: Vec<String>,
    spawn_fails: bool,
    spawn_never_starts: bool,
    kill_never_stops: bool,
    calls: Vec<String>,
    spawns: Vec<SpawnRequest>,
    terminated: Vec<Option<u32>>,
}

/// Simulates flatpak and the helper commands. Spawning starts the service
/// and terminating stops it unless told otherwise.
#[derive(Default)]
pub struct FakeProcessControl {
    state: Mutex<FakeState>,
}

impl FakeProcessControl {
    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_running(&self, running: bool) {
        self.with(|s| s.running = running);
    }

    pub fn set_installed(&self, installed: bool) {
        self.with(|s| s.installed = installed);
    }

    /// drm_info outputs in order; the last one repeats.
    pub fn script_display(&self, outputs: &[&str]) {
        self.with(|s| s.display = outputs.iter().map(|v| v.to_string()).collect());
    }

    /// Stdout for commands starting with `prefix`.
    pub fn set_output(&self, prefix: &str, stdout: &str) {
        self.with(|s| s.outputs.push((prefix.to_string(), stdout.to_string())));
    }

    /// Commands starting with `prefix` exit with status 1.
    pub fn fail_command(&self, prefix: &str) {
        self.with(|s| s.failing.push(prefix.to_string()));
    }

    pub fn fail_spawn(&self) {
        self.with(|s| s.spawn_fails = true);
    }

    pub fn spawn_never_starts(&self) {
        self.with(|s| s.spawn_never_starts = true);
    }

    pub fn kill_never_stops(&self) {
        self.with(|s| s.kill_never_stops = true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
    }

    pub fn spawns(&self) -> Vec<SpawnRequest> {
        self.with(|s| s.spawns.clone())
    }

    pub fn terminated(&self) -> Vec<Option<u32>> {
        self.with(|s| s.terminated.clone())
    }
}

impl ProcessControl for FakeProcessControl {
    async fn list_by_name(&self, name: &str) -> Result<Vec<u32>, ProcessError> {
        self.with(|s| {
            s.calls.push(format!("list {}", name));
            if s.running && name == SUNSHINE_APP_ID {
                Ok(vec![FAKE_PID])
            } else {
                Ok(vec![])
            }
        })
    }

    async fn spawn_detached(&self, request: &SpawnRequest) -> Result<u32, ProcessError> {
        self.with(|s| {
            s.spawns.push(request.clone());
            if s.spawn_fails {
                return Err(ProcessError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)));
            }
            if !s.spawn_never_starts {
                s.running = true;
            }
            Ok(7000 + s.spawns.len() as u32)
        })
    }

    async fn terminate_group(&self, _name: &str, group: Option<u32>) -> Result<(), ProcessError> {
        self.with(|s| {
            s.terminated.push(group);
            if !s.kill_never_stops {
                s.running = false;
            }
            Ok(())
        })
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, ProcessError> {
        self.with(|s| {
            let command = format!("{} {}", program, args.join(" ")).trim().to_string();
            s.calls.push(command.clone());

            if s.failing.iter().any(|prefix| command.starts_with(prefix.as_str())) {
                return Err(ProcessError::CommandFailed {
                    command,
                    code: Some(1),
                    stderr: "scripted failure".to_string(),
                });
            }

            if command.starts_with("drm_info") {
                let output = match s.display.len() {
                    0 => ATTACHED_FRAMEBUFFER.to_string(),
                    1 => s.display[0].clone(),
                    _ => s.display.pop_front().unwrap_or_default(),
                };
                return Ok(output);
            }

            if command.starts_with("flatpak list") {
                return Ok(if s.installed { format!("org.freedesktop.Platform\n{}\n", SUNSHINE_APP_ID) } else { String::new() });
            }

            if command.starts_with("flatpak install") {
                s.installed = true;
                return Ok(String::new());
            }

            let output = s
                .outputs
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, stdout)| stdout.clone());
            Ok(output.unwrap_or_default())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub path: String,
    pub auth_header: Option<String>,
    pub body: Option<Value>,
}

/// Per path response queues; the last response of a queue repeats. Paths
/// without responses are unreachable.
#[derive(Default)]
pub struct FakeHttpClient {
    responses: Mutex<HashMap<String, VecDeque<RequestResult>>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl FakeHttpClient {
    pub fn respond(&self, path: &str, result: RequestResult) {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn requests_to(&self, path: &str) -> Vec<SentRequest> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|req| req.path == path)
            .cloned()
            .collect()
    }
}

impl ControlHttpClient for FakeHttpClient {
    async fn request(&self, path: &str, auth_header: Option<&str>, body: Option<&Value>) -> RequestResult {
        self.sent.lock().unwrap().push(SentRequest {
            path: path.to_string(),
            auth_header: auth_header.map(|v| v.to_string()),
            body: body.cloned(),
        });

        let mut responses = self.responses.lock().unwrap();
        let Some(queue) = responses.get_mut(path) else {
            return RequestResult::Error(RequestError::Unreachable);
        };

        match queue.len() {
            0 => RequestResult::Error(RequestError::Unreachable),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or(RequestResult::Error(RequestError::Other)),
        }
    }
}
