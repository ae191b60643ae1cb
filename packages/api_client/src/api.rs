use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// Transport used by [`SunshineApiClient`]. A request carries a body only
/// when it is a POST.
pub trait ControlHttpClient {
    fn request(
        &self,
        path: &str,
        auth_header: Option<&str>,
        body: Option<&Value>,
    ) -> impl std::future::Future<Output = RequestResult> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestError {
    /// The service answered 401; credentials are missing or wrong.
    Unauthorized,
    /// Nothing is listening on the control port (yet).
    Unreachable,
    Other,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::Unauthorized => write!(f, "unauthorized"),
            RequestError::Unreachable => write!(f, "unreachable"),
            RequestError::Other => write!(f, "other"),
        }
    }
}

impl std::error::Error for RequestError {}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestResult {
    Success(Value),
    Error(RequestError),
}

impl RequestResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, RequestResult::Success(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RequestResult::Error(RequestError::Unauthorized))
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, RequestResult::Error(RequestError::Unreachable))
    }

    pub fn into_result(self) -> Result<Value, RequestError> {
        match self {
            RequestResult::Success(data) => Ok(data),
            RequestResult::Error(error) => Err(error),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ReqPin {
    pub pin: String,
    pub name: String,
}

#[derive(Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReqPassword {
    pub new_username: String,
    pub new_password: String,
    pub confirm_new_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,
}

impl ReqPassword {
    pub fn new(username: &str, password: &str) -> Self {
        ReqPassword {
            new_username: username.to_string(),
            new_password: password.to_string(),
            confirm_new_password: password.to_string(),
            current_username: None,
            current_password: None,
        }
    }

    pub fn with_current(mut self, username: &str, password: &str) -> Self {
        self.current_username = Some(username.to_string());
        self.current_password = Some(password.to_string());
        self
    }
}

impl std::fmt::Debug for ReqPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqPassword")
            .field("new_username", &self.new_username)
            .field("current_username", &self.current_username)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    #[serde(deserialize_with = "status_flag")]
    pub status: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientList {
    #[serde(deserialize_with = "status_flag")]
    pub status: bool,
    #[serde(default)]
    pub named_certs: Vec<ClientRecord>,
}

impl ClientList {
    pub fn count_named(&self, name: &str) -> usize {
        self.named_certs
            .iter()
            .filter(|client| client.name.as_deref() == Some(name))
            .count()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Sunshine reports `status` as a JSON boolean in most versions and as the
/// strings `"true"` / `"false"` in others. Anything else is a parse error.
pub fn parse_status(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) if text == "true" => Some(true),
        Value::String(text) if text == "false" => Some(false),
        _ => None,
    }
}

fn status_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_status(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid status representation: {}", value))
    })
}

pub struct SunshineApiClient<C: ControlHttpClient> {
    client: C,
    auth_header: RwLock<Option<String>>,
}

impl<C: ControlHttpClient> SunshineApiClient<C> {
    pub fn new(client: C) -> Self {
        SunshineApiClient {
            client,
            auth_header: RwLock::new(None),
        }
    }

    pub fn get_client(&self) -> &C {
        &self.client
    }

    pub async fn auth_header(&self) -> Option<String> {
        self.auth_header.read().await.clone()
    }

    pub async fn set_auth_header(&self, auth_header: Option<String>) {
        let mut lock = self.auth_header.write().await;
        *lock = auth_header.filter(|v| !v.is_empty());
    }

    pub async fn request(&self, path: &str, body: Option<&Value>) -> RequestResult {
        let auth_header = self.auth_header().await;
        self.client.request(path, auth_header.as_deref(), body).await
    }

    async fn call<Res: DeserializeOwned>(&self, path: &str, body: Option<Value>) -> Result<Res, RequestError> {
        let data = self.request(path, body.as_ref()).await.into_result()?;

        serde_json::from_value(data).map_err(|error| {
            tracing::error!(?error, path, "unexpected response shape");
            RequestError::Other
        })
    }

    fn body<Req: Serialize>(path: &str, req: &Req) -> Result<Value, RequestError> {
        serde_json::to_value(req).map_err(|error| {
            tracing::error!(?error, path, "failed to serialize request");
            RequestError::Other
        })
    }

    /// Cheap authenticated endpoint, used to probe reachability and credentials.
    pub async fn apps(&self) -> Result<Value, RequestError> {
        self.call("/api/apps", None).await
    }

    /// Response status of this endpoint does not reflect whether pairing
    /// actually happened.
    pub async fn pin(&self, req: &ReqPin) -> Result<StatusResponse, RequestError> {
        let body = Self::body("/api/pin", req)?;
        self.call("/api/pin", Some(body)).await
    }

    pub async fn password(&self, req: &ReqPassword) -> Result<StatusResponse, RequestError> {
        let body = Self::body("/api/password", req)?;
        self.call("/api/password", Some(body)).await
    }

    pub async fn clients_list(&self) -> Result<ClientList, RequestError> {
        self.call("/api/clients/list", None).await
    }
}
