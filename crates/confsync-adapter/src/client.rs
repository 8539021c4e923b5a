//! API client
//!
//! The [`ApiClient`] trait is the only seam between the core and the remote
//! service. [`RestApiClient`] implements it over `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::{AuthConfig, ClientConfig};
use crate::error::{AdapterError, AdapterResult};

/// HTTP methods used by deploy endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub data: JsonValue,
}

impl ApiResponse {
    pub fn new(status: u16, data: JsonValue) -> Self {
        Self { status, data }
    }

    pub fn ok(data: JsonValue) -> Self {
        Self::new(200, data)
    }
}

/// A failed request. `status` is absent for transport failures.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: Option<u16>,
    pub message: String,
    /// Decoded response body, if any.
    pub data: Option<JsonValue>,
}

impl HttpError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    /// Conflicts, throttling, server errors and transport failures.
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status == 409 || status == 429 || status >= 500,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "Request failed with status code {status}: {}", self.message),
            None => write!(f, "Request failed: {}", self.message),
        }
    }
}

impl std::error::Error for HttpError {}

/// Generic request capability of a remote API.
///
/// Implementors provide [`ApiClient::request`]; the verb helpers delegate to it.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Issue a request. `url` is relative to the client's base URL.
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<JsonValue>,
    ) -> Result<ApiResponse, HttpError>;

    async fn get(&self, url: &str) -> Result<ApiResponse, HttpError> {
        self.request(HttpMethod::Get, url, None).await
    }

    async fn post(&self, url: &str, body: JsonValue) -> Result<ApiResponse, HttpError> {
        self.request(HttpMethod::Post, url, Some(body)).await
    }

    async fn put(&self, url: &str, body: JsonValue) -> Result<ApiResponse, HttpError> {
        self.request(HttpMethod::Put, url, Some(body)).await
    }

    async fn patch(&self, url: &str, body: JsonValue) -> Result<ApiResponse, HttpError> {
        self.request(HttpMethod::Patch, url, Some(body)).await
    }

    async fn delete(&self, url: &str) -> Result<ApiResponse, HttpError> {
        self.request(HttpMethod::Delete, url, None).await
    }
}

/// [`ApiClient`] over HTTP.
pub struct RestApiClient {
    client: Client,
    base_url: String,
    auth: AuthConfig,
}

impl fmt::Debug for RestApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestApiClient {
    /// Create a client from configuration.
    pub fn new(config: &ClientConfig) -> AdapterResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdapterError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn full_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        format!("{}/{}", self.base_url, url.trim_start_matches('/'))
    }

    fn build_request(&self, method: HttpMethod, url: &str) -> reqwest::RequestBuilder {
        let url = self.full_url(url);
        let builder = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Patch => self.client.patch(url),
            HttpMethod::Delete => self.client.delete(url),
        };
        match &self.auth {
            AuthConfig::None => builder,
            AuthConfig::Basic { username, password } => {
                builder.basic_auth(username, password.as_deref())
            }
            AuthConfig::Bearer { token } => builder.bearer_auth(token),
        }
    }
}

fn decode_body(bytes: &[u8]) -> JsonValue {
    if bytes.is_empty() {
        return JsonValue::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl ApiClient for RestApiClient {
    #[instrument(skip(self, body))]
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<JsonValue>,
    ) -> Result<ApiResponse, HttpError> {
        let mut builder = self.build_request(method, url);
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HttpError::new(e.status().map(|s| s.as_u16()), e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HttpError::new(Some(status.as_u16()), e.to_string()))?;
        let data = decode_body(&bytes);

        if method == HttpMethod::Get && status == StatusCode::NOT_FOUND {
            debug!(url = %url, "Resource not found, returning empty result");
            return Ok(ApiResponse::new(status.as_u16(), JsonValue::Array(Vec::new())));
        }

        if !status.is_success() {
            warn!(url = %url, status = %status, "Request failed");
            return Err(HttpError::new(
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("unknown status"),
            )
            .with_data(data));
        }

        debug!(url = %url, status = %status, "Request succeeded");
        Ok(ApiResponse::new(status.as_u16(), data))
    }
}
