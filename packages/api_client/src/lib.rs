use std::time::Duration;

use crate::api::SunshineApiClient;
use crate::http_client::{HttpClient, HttpClientError};

pub mod api;
pub mod http_client;

pub const DEFAULT_API_BASE: &str = "https://127.0.0.1:47990";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub type SunshineApi = SunshineApiClient<HttpClient>;

impl SunshineApi {
    pub fn create(api_base: String, timeout: Duration) -> Result<Self, HttpClientError> {
        Ok(SunshineApiClient::new(HttpClient::new(api_base, timeout)?))
    }
}
