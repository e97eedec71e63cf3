//! Authenticated fetch helper — bearer-token requests to the backend API.
//!
//! DESIGN
//! ======
//! `UseFetch` owns one fetch slot: a `FetchState` plus the `FetchKey` of the
//! inputs that produced it. Running it again with the same endpoint and equal
//! options is a no-op, however the options value was built. The key is a
//! SHA-256 over the endpoint and the canonical JSON of the options.
//!
//! ERROR HANDLING
//! ==============
//! Token, transport, status and parse failures all land in
//! `FetchState::error`; the previous `data` is kept. Nothing is retried.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Backend record shown on the protected page.
pub const USER_RECORD_ENDPOINT: &str = "/v1/users/me";

const REQUEST_TIMEOUT_SECS: u64 = 15;
const CONNECT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// No access token could be obtained for the request.
    #[error("access token unavailable: {0}")]
    Token(String),
    #[error("invalid request header: {0}")]
    InvalidHeader(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP Error! status: {status}")]
    Status { status: u16 },
    #[error("response parse failed: {0}")]
    Parse(String),
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

// =============================================================================
// REQUEST OPTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Caller-supplied request options. The bearer header is merged over these.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl FetchOptions {
    /// `GET` with `Content-Type: application/json`.
    #[must_use]
    pub fn json() -> Self {
        Self::default().header("Content-Type", "application/json")
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_owned(), value.to_owned());
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Content-derived identity of a fetch's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchKey([u8; 32]);

impl FetchKey {
    #[must_use]
    pub fn new(endpoint: &str, options: &FetchOptions) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(endpoint.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(options).unwrap_or_default());
        let mut key = [0u8; 32];
        key.copy_from_slice(&hasher.finalize());
        Self(key)
    }
}

// =============================================================================
// TOKEN SOURCE
// =============================================================================

/// Anything that can hand out an access token for the current user.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// # Errors
    ///
    /// Returns [`FetchError::Token`] when no token can be produced.
    async fn access_token(&self) -> Result<String, FetchError>;
}

// =============================================================================
// API CLIENT
// =============================================================================

/// HTTP client bound to the backend API base URL.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns [`FetchError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `{base_url}{endpoint}` with a bearer token and parse the JSON body.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on bad headers, transport failure, non-2xx
    /// status, or a body that is not JSON.
    pub async fn request_json(
        &self,
        token: &str,
        endpoint: &str,
        options: &FetchOptions,
    ) -> Result<serde_json::Value, FetchError> {
        let headers = merged_headers(token, &options.headers)?;
        let mut request = self
            .http
            .request(options.method.into(), format!("{}{endpoint}", self.base_url))
            .headers(headers);
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// Caller headers, then `Authorization: Bearer <token>` on top.
fn merged_headers(token: &str, extra: &BTreeMap<String, String>) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| FetchError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
        headers.insert(name, value);
    }
    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| FetchError::InvalidHeader(AUTHORIZATION.to_string()))?;
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}

// =============================================================================
// FETCH SLOT
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct FetchState {
    pub data: Option<serde_json::Value>,
    pub loading: bool,
    pub error: Option<FetchError>,
}

/// One fetch slot, re-run only when its inputs change.
#[derive(Debug, Default)]
pub struct UseFetch {
    key: Option<FetchKey>,
    state: FetchState,
}

impl UseFetch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &FetchState {
        &self.state
    }

    /// Fetch `endpoint` unless the last run used identical inputs.
    pub async fn run(
        &mut self,
        api: &ApiClient,
        tokens: &dyn TokenSource,
        endpoint: &str,
        options: &FetchOptions,
    ) -> &FetchState {
        let key = FetchKey::new(endpoint, options);
        if self.key == Some(key) {
            return &self.state;
        }
        self.key = Some(key);
        self.state.loading = true;
        self.state.error = None;

        let outcome = match tokens.access_token().await {
            Ok(token) => api.request_json(&token, endpoint, options).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(data) => self.state.data = Some(data),
            Err(e) => {
                tracing::error!(%endpoint, error = %e, "authenticated fetch failed");
                self.state.error = Some(e);
            }
        }
        self.state.loading = false;
        &self.state
    }
}

/// Single-shot fetch into a fresh slot.
pub async fn fetch_json(
    api: &ApiClient,
    tokens: &dyn TokenSource,
    endpoint: &str,
    options: &FetchOptions,
) -> FetchState {
    let mut slot = UseFetch::new();
    slot.run(api, tokens, endpoint, options).await.clone()
}

#[cfg(test)]
#[path = "fetch_test.rs"]
mod tests;
