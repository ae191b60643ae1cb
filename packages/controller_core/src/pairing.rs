use std::time::Duration;

use sunshine_api_client::api::{ControlHttpClient, ReqPin, RequestError};

use crate::controller::SunshineController;
use crate::error::PairingError;
use crate::process::ProcessControl;

/// Time the service needs before a new client shows up in its list.
pub const PAIRING_SETTLE_DELAY: Duration = Duration::from_secs(1);

impl<P: ProcessControl, C: ControlHttpClient> SunshineController<P, C> {
    /// `/api/pin` reports success for any well formed request, so pairing is
    /// only confirmed when exactly one more client named `client_name`
    /// appears. Names are not unique, so the count is compared rather than
    /// checking for presence.
    pub async fn pair(&self, pin: &str, client_name: &str) -> Result<(), PairingError> {
        if pin.is_empty() || client_name.is_empty() {
            tracing::info!("no pin or client name provided for pairing");
            return Err(PairingError::MissingInput);
        }

        let before = self.count_clients_named(client_name).await.map_err(|error| {
            tracing::error!(%error, "could not get client count before pairing");
            PairingError::CountBefore(error)
        })?;

        let req = ReqPin {
            pin: pin.to_string(),
            name: client_name.to_string(),
        };

        let response = self.api.pin(&req).await.map_err(|error| {
            tracing::error!(%error, "failed to send pin and client name to sunshine");
            PairingError::Request(error)
        })?;

        if !response.status {
            tracing::error!("sunshine rejected the pin");
            return Err(PairingError::Rejected);
        }

        tokio::time::sleep(PAIRING_SETTLE_DELAY).await;

        let after = self.count_clients_named(client_name).await.map_err(|error| {
            tracing::error!(%error, "could not get client count after pairing");
            PairingError::CountAfter(error)
        })?;

        if after != before + 1 {
            tracing::warn!(before, after, client_name, "pairing not confirmed by client list");
            return Err(PairingError::NotConfirmed { before, after });
        }

        tracing::info!(client_name, "client paired");
        Ok(())
    }

    async fn count_clients_named(&self, name: &str) -> Result<usize, RequestError> {
        let list = self.api.clients_list().await?;
        if !list.status {
            return Err(RequestError::Other);
        }
        Ok(list.count_named(name))
    }
}
