use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::Serialize;
use sunshine_api_client::api::{ControlHttpClient, ReqPassword, RequestError};

use crate::controller::SunshineController;
use crate::error::CredentialsError;
use crate::process::ProcessControl;

const BASIC_PREFIX: &str = "Basic ";
pub const INITIAL_USERNAME: &str = "decky_sunshine";

#[derive(Serialize, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

pub fn encode_auth_header(username: &str, password: &str) -> Option<String> {
    if username.is_empty() || password.is_empty() {
        return None;
    }

    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    Some(format!("{}{}", BASIC_PREFIX, encoded))
}

pub fn decode_auth_header(auth_header: &str) -> Option<Credentials> {
    let encoded = auth_header.strip_prefix(BASIC_PREFIX)?;

    let decoded = match STANDARD.decode(encoded.trim()) {
        Ok(v) => v,
        Err(error) => {
            tracing::error!(?error, "failed to decode credentials from auth header");
            return None;
        }
    };

    let text = match String::from_utf8(decoded) {
        Ok(v) => v,
        Err(error) => {
            tracing::error!(?error, "credentials in auth header are not utf-8");
            return None;
        }
    };

    let (username, password) = text.split_once(':')?;
    Some(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// 6 random bytes, base64url encoded to 8 characters.
pub fn generate_password() -> String {
    let bytes: [u8; 6] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

impl<P: ProcessControl, C: ControlHttpClient> SunshineController<P, C> {
    /// Replaces the active token. The plaintext is not kept.
    pub async fn set_credentials(&self, username: &str, password: &str) -> Result<String, CredentialsError> {
        let Some(auth_header) = encode_auth_header(username, password) else {
            tracing::info!("no username or password provided for setting auth header");
            return Err(CredentialsError::Empty);
        };

        self.api.set_auth_header(Some(auth_header.clone())).await;
        Ok(auth_header)
    }

    pub async fn get_credentials(&self) -> Option<Credentials> {
        let Some(auth_header) = self.api.auth_header().await else {
            tracing::info!("auth header is not set");
            return None;
        };

        let credentials = decode_auth_header(&auth_header);
        if credentials.is_none() {
            tracing::info!("auth header is invalid");
        }
        credentials
    }

    pub async fn auth_header(&self) -> Option<String> {
        self.api.auth_header().await
    }

    /// Installs a previously persisted token as the active one.
    pub async fn restore_auth_header(&self, auth_header: String) {
        self.api.set_auth_header(Some(auth_header)).await;
    }

    /// `None` when the service is not running or could not be asked.
    pub async fn are_credentials_valid(&self) -> Option<bool> {
        if !self.is_running().await {
            return None;
        }

        match self.api.apps().await {
            Ok(_) => Some(true),
            Err(RequestError::Unauthorized) => Some(false),
            Err(_) => None,
        }
    }

    /// Rotates the service's user, authenticating with the active token.
    pub async fn change_credentials(&self, username: &str, password: &str) -> Result<(), CredentialsError> {
        if username.is_empty() || password.is_empty() {
            return Err(CredentialsError::Empty);
        }

        let current = self
            .get_credentials()
            .await
            .ok_or(CredentialsError::NoCurrentCredentials)?;

        let req = ReqPassword::new(username, password).with_current(&current.username, &current.password);
        self.set_user(&req).await
    }

    pub(crate) async fn set_user(&self, req: &ReqPassword) -> Result<(), CredentialsError> {
        let response = match self.api.password(req).await {
            Ok(v) => v,
            Err(error) => {
                tracing::error!(%error, "no response received while setting user");
                return Err(CredentialsError::Request(error));
            }
        };

        if !response.status {
            tracing::error!(username = %req.new_username, "user was not changed");
            return Err(CredentialsError::Rejected);
        }

        self.set_credentials(&req.new_username, &req.new_password).await?;
        Ok(())
    }
}
