use std::fmt::{Display, Formatter};

use sunshine_api_client::api::RequestError;

use crate::process::ProcessError;

#[derive(Debug)]
pub enum StartError {
    /// No framebuffer was attached within the readiness budget.
    DisplayUnavailable,
    HelperPermissions(ProcessError),
    Spawn(ProcessError),
    NotRunningAfterSpawn,
}

impl Display for StartError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::DisplayUnavailable => write!(f, "no display became available"),
            StartError::HelperPermissions(error) => write!(f, "failed to prepare sandbox helper: {}", error),
            StartError::Spawn(error) => write!(f, "failed to spawn sunshine: {}", error),
            StartError::NotRunningAfterSpawn => write!(f, "sunshine process did not appear after launch"),
        }
    }
}

impl std::error::Error for StartError {}

#[derive(Debug)]
pub enum StopError {
    StillRunning,
}

impl Display for StopError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StopError::StillRunning => write!(f, "sunshine process did not exit"),
        }
    }
}

impl std::error::Error for StopError {}

/// Provisioning failures need privileged intervention and are never retried.
#[derive(Debug)]
pub enum DependencyError {
    Helper(std::io::Error),
    Install(ProcessError),
    Start(StartError),
    InitialCredentials(CredentialsError),
}

impl Display for DependencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyError::Helper(error) => write!(f, "failed to copy sandbox helper: {}", error),
            DependencyError::Install(error) => write!(f, "failed to install sunshine: {}", error),
            DependencyError::Start(error) => write!(f, "failed to start sunshine after install: {}", error),
            DependencyError::InitialCredentials(error) => write!(f, "failed to set initial credentials: {}", error),
        }
    }
}

impl std::error::Error for DependencyError {}

#[derive(Debug)]
pub enum UpdateError {
    Stop(StopError),
    Install(ProcessError),
    Start(StartError),
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateError::Stop(error) => write!(f, "couldn't stop sunshine for update: {}", error),
            UpdateError::Install(error) => write!(f, "couldn't update sunshine: {}", error),
            UpdateError::Start(error) => write!(f, "couldn't start sunshine after update: {}", error),
        }
    }
}

impl std::error::Error for UpdateError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    MissingInput,
    CountBefore(RequestError),
    Request(RequestError),
    Rejected,
    CountAfter(RequestError),
    /// The pin endpoint claimed success but the client list did not grow by exactly one.
    NotConfirmed { before: usize, after: usize },
}

impl Display for PairingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PairingError::MissingInput => write!(f, "pin and client name are required"),
            PairingError::CountBefore(error) => write!(f, "could not get client count before pairing: {}", error),
            PairingError::Request(error) => write!(f, "failed to send pin: {}", error),
            PairingError::Rejected => write!(f, "sunshine rejected the pin"),
            PairingError::CountAfter(error) => write!(f, "could not get client count after pairing: {}", error),
            PairingError::NotConfirmed { before, after } => {
                write!(f, "pairing not confirmed, client count went from {} to {}", before, after)
            }
        }
    }
}

impl std::error::Error for PairingError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    Empty,
    /// No usable token is stored, so the current credentials are unknown.
    NoCurrentCredentials,
    Request(RequestError),
    Rejected,
    NoResponse,
}

impl Display for CredentialsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialsError::Empty => write!(f, "username and password must not be empty"),
            CredentialsError::NoCurrentCredentials => write!(f, "no current credentials stored"),
            CredentialsError::Request(error) => write!(f, "request failed: {}", error),
            CredentialsError::Rejected => write!(f, "sunshine did not change the user"),
            CredentialsError::NoResponse => write!(f, "no response received while setting user"),
        }
    }
}

impl std::error::Error for CredentialsError {}
