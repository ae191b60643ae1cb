use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{setsid, Pid};
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Complete environment of the child, nothing is inherited.
    pub env: HashMap<String, String>,
}

/// OS process control used by the supervisor. The system implementation
/// goes through flatpak; tests substitute a fake.
pub trait ProcessControl: Send + Sync {
    /// Pids of running instances whose application name is exactly `name`.
    fn list_by_name(&self, name: &str) -> impl Future<Output = Result<Vec<u32>, ProcessError>> + Send;

    /// Starts the request in a new session and returns its process group id.
    fn spawn_detached(&self, request: &SpawnRequest) -> impl Future<Output = Result<u32, ProcessError>> + Send;

    /// Asks the sandbox to terminate `name` and signals the launcher's
    /// process group, if one is known.
    fn terminate_group(&self, name: &str, group: Option<u32>) -> impl Future<Output = Result<(), ProcessError>> + Send;

    /// Runs a command to completion, returning stdout on a zero exit status.
    fn run(&self, program: &str, args: &[&str]) -> impl Future<Output = Result<String, ProcessError>> + Send;
}

#[derive(Debug)]
pub enum ProcessError {
    Io(std::io::Error),
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    Signal(Errno),
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Io(error) => write!(f, "io error: {}", error),
            ProcessError::CommandFailed { command, code, stderr } => match code {
                Some(code) => write!(f, "`{}` failed with return code {}: {}", command, code, stderr),
                None => write!(f, "`{}` was terminated by a signal: {}", command, stderr),
            },
            ProcessError::Signal(errno) => write!(f, "failed to send signal: {}", errno),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<std::io::Error> for ProcessError {
    fn from(e: std::io::Error) -> Self {
        ProcessError::Io(e)
    }
}

impl From<Errno> for ProcessError {
    fn from(e: Errno) -> Self {
        ProcessError::Signal(e)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SystemProcessControl;

impl ProcessControl for SystemProcessControl {
    async fn list_by_name(&self, name: &str) -> Result<Vec<u32>, ProcessError> {
        let stdout = self.run("flatpak", &["ps", "--columns=pid,application"]).await?;
        Ok(parse_instances(&stdout, name))
    }

    #[allow(unsafe_code)]
    async fn spawn_detached(&self, request: &SpawnRequest) -> Result<u32, ProcessError> {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .env_clear()
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // SAFETY: setsid is async-signal-safe and nothing is allocated in the closure
        unsafe {
            command.pre_exec(|| {
                setsid().map(|_| ()).map_err(std::io::Error::from)
            });
        }

        let mut child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| std::io::Error::other("launcher exited before its pid was read"))?;

        /* reap the launcher shell so it does not linger as a zombie */
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::info!(%status, pid, "launcher exited"),
                Err(error) => tracing::warn!(?error, pid, "failed to wait for launcher"),
            }
        });

        Ok(pid)
    }

    async fn terminate_group(&self, name: &str, group: Option<u32>) -> Result<(), ProcessError> {
        let kill = self.run("flatpak", &["kill", name]).await.map(|_| ());

        if let Some(group) = group {
            match killpg(Pid::from_raw(group as i32), Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(errno) => {
                    tracing::warn!(?errno, group, "failed to signal launcher process group");
                    if kill.is_ok() {
                        return Err(ProcessError::Signal(errno));
                    }
                }
            }
        }

        kill
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, ProcessError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProcessError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parses `flatpak ps --columns=pid,application` output.
pub fn parse_instances(stdout: &str, name: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?;
            let application = fields.next()?;

            if application != name {
                return None;
            }

            match pid.parse::<u32>() {
                Ok(pid) if pid != 0 => Some(pid),
                _ => {
                    tracing::warn!(line, "ignoring instance with invalid pid");
                    None
                }
            }
        })
        .collect()
}
