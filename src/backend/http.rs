//! Thin JSON client over the marketplace REST API.
//!
//! Responses are accepted either bare or wrapped in `{ "data": ... }`;
//! both shapes are produced by the backend depending on the route.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SyncError;

/// Shared HTTP client bound to an API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Http`] if the underlying client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET {base}{path}` and decode the (possibly enveloped) body.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Http`], [`SyncError::Status`] or
    /// [`SyncError::Decode`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    /// Sends `body` with `method` to `{base}{path}` and decodes the reply.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Http`], [`SyncError::Status`] or
    /// [`SyncError::Decode`].
    pub async fn send_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, SyncError> {
        self.request(method, path, body).await
    }

    async fn request<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, SyncError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%url, %method, status = status.as_u16(), "request failed");
            return Err(SyncError::Status(status.as_u16()));
        }

        let value: serde_json::Value = response.json().await?;
        decode_body(value)
    }
}

/// Decodes a response body that may be wrapped in `{ "data": ... }`.
///
/// # Errors
///
/// Returns [`SyncError::Decode`] if neither shape matches `T`.
pub fn decode_body<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, SyncError> {
    if let serde_json::Value::Object(ref map) = value
        && let Some(inner) = map.get("data")
        && let Ok(decoded) = serde_json::from_value::<T>(inner.clone())
    {
        return Ok(decoded);
    }
    Ok(serde_json::from_value(value)?)
}
