pub mod config;
pub mod controller;
pub mod credentials;
pub mod environment;
pub mod error;
pub mod installer;
pub mod package;
pub mod pairing;
pub mod process;
pub mod readiness;
pub mod retry;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use config::ControllerConfig;
pub use controller::{SunshineController, SystemController};
pub use credentials::Credentials;
pub use package::VersionInfo;
