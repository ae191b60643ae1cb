use std::error::Error;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONNECTION};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::Value;

use crate::api::{ControlHttpClient, RequestError, RequestResult};

pub const USER_AGENT: &str = "decky-sunshine";
const ACCEPT_JSON: &str = "application/json, */*; q=0.01";

pub struct HttpClient {
    api_base: String,
    client: reqwest::Client,
}

impl HttpClient {
    /// Builds a client for the service's loopback API. The service presents a
    /// self-signed certificate so verification is off, but the connection is
    /// still TLS when `api_base` is `https`. Redirects are never followed.
    pub fn new(api_base: String, timeout: Duration) -> Result<Self, HttpClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(Policy::none())
            .timeout(timeout)
            .no_proxy()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(HttpClient { api_base, client })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

impl ControlHttpClient for HttpClient {
    async fn request(&self, path: &str, auth_header: Option<&str>, body: Option<&Value>) -> RequestResult {
        let url = format!("{}{}", self.api_base, path);

        let mut builder = match body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.get(url),
        };

        if let Some(auth_header) = auth_header {
            builder = builder.header(AUTHORIZATION, auth_header);
        }

        let response = match builder.send().await {
            Ok(v) => v,
            Err(error) => {
                let kind = classify_transport_error(&error);
                match kind {
                    RequestError::Unreachable => {
                        tracing::error!(path, "server not reachable: connection refused");
                    }
                    _ => {
                        tracing::error!(?error, path, "request failed");
                    }
                }
                return RequestResult::Error(kind);
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return RequestResult::Error(RequestError::Unauthorized);
        }

        if status != StatusCode::OK {
            tracing::error!(path, %status, "request returned unexpected status");
            return RequestResult::Error(RequestError::Other);
        }

        let response_txt = match response.text().await {
            Ok(v) => v,
            Err(error) => {
                tracing::error!(?error, path, "failed to read response body");
                return RequestResult::Error(RequestError::Other);
            }
        };

        match serde_json::from_str::<Value>(&response_txt) {
            Ok(data) => RequestResult::Success(data),
            Err(error) => {
                tracing::error!(?error, path, "failed to parse json:\n{}", response_txt);
                RequestResult::Error(RequestError::Other)
            }
        }
    }
}

/// Connection refused anywhere in the error chain means the service is not
/// listening yet. Everything else (TLS failure, timeout, reset) is `Other`.
pub fn classify_transport_error(error: &reqwest::Error) -> RequestError {
    let mut source: Option<&(dyn Error + 'static)> = error.source();

    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            if io_error.kind() == std::io::ErrorKind::ConnectionRefused {
                return RequestError::Unreachable;
            }
        }
        source = cause.source();
    }

    RequestError::Other
}

#[derive(Debug)]
pub enum HttpClientError {
    BuildError(reqwest::Error),
}

impl std::fmt::Display for HttpClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpClientError::BuildError(error) => write!(f, "failed to build http client: {}", error),
        }
    }
}

impl std::error::Error for HttpClientError {}

impl From<reqwest::Error> for HttpClientError {
    fn from(value: reqwest::Error) -> Self {
        HttpClientError::BuildError(value)
    }
}
