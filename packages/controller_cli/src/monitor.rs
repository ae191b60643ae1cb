use std::time::Duration;

use serde::Serialize;
use sunshine_api_client::api::ControlHttpClient;
use sunshine_controller_core::process::ProcessControl;
use sunshine_controller_core::SunshineController;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Version lookups refresh the remote index, so they run far less often.
pub const VERSION_INTERVAL: Duration = Duration::from_secs(600);

/// Remembers the last observed value and reports changes.
pub struct Tracker<T> {
    name: &'static str,
    last: Option<T>,
}

impl<T: Serialize + PartialEq> Tracker<T> {
    pub fn new(name: &'static str) -> Self {
        Tracker { name, last: None }
    }

    /// Returns true and logs the transition if `value` differs from the last one.
    pub fn update(&mut self, value: T) -> bool {
        if self.last.as_ref() == Some(&value) {
            return false;
        }

        let before = self.last.as_ref().map(describe).unwrap_or_else(|| "unknown".to_string());
        let after = describe(&value);
        tracing::info!(name = self.name, %before, %after, "state changed");

        self.last = Some(value);
        true
    }
}

fn describe<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "?".to_string())
}

pub async fn run_monitor<P: ProcessControl, C: ControlHttpClient>(
    controller: &SunshineController<P, C>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut running = Tracker::new("running");
    let mut credentials_valid = Tracker::new("credentials_valid");
    let mut version_info = Tracker::new("version_info");

    let mut state_tick = tokio::time::interval(interval);
    state_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut version_tick = tokio::time::interval(VERSION_INTERVAL);
    version_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_secs = interval.as_secs(), "monitoring sunshine");

    loop {
        tokio::select! {
            _ = state_tick.tick() => {
                running.update(controller.is_running().await);
                credentials_valid.update(controller.are_credentials_valid().await);
            }
            _ = version_tick.tick() => {
                version_info.update(controller.version_info().await);
            }
            _ = cancel.cancelled() => {
                tracing::info!("monitor stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reports_only_transitions() {
        let mut tracker = Tracker::new("running");
        assert!(tracker.update(false));
        assert!(!tracker.update(false));
        assert!(tracker.update(true));
        assert!(!tracker.update(true));
        assert!(tracker.update(false));
    }

    #[test]
    fn unknown_is_a_distinct_value() {
        let mut tracker: Tracker<Option<bool>> = Tracker::new("credentials_valid");
        assert!(tracker.update(None));
        assert!(!tracker.update(None));
        assert!(tracker.update(Some(false)));
    }

    #[test]
    fn values_render_as_json() {
        assert_eq!(describe(&Some(true)), "true");
        assert_eq!(describe(&None::<bool>), "null");
    }
}
