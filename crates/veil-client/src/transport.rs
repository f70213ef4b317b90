//! HTTP transport seam.
//!
//! All backend traffic is `POST` with a form-urlencoded body and a JSON
//! (or plain text) response. The [`HttpTransport`] trait is the only
//! place the engine touches the network, so tests swap in scripted
//! implementations and the rest of the engine stays deterministic.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, TransportError};

/// A complete server response: status plus raw body text.
///
/// Non-2xx statuses are data, not errors - the caller decides whether a
/// rejection is fatal (and the raw body is kept for error surfaces).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl HttpResponse {
    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ClientError::InvalidResponse { reason: e.to_string() })
    }
}

/// Object-safe POST-a-form seam to the backend.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// Issue one `POST` with a form-urlencoded body and collect the full
    /// response. Fails only on network-level problems; any status code is
    /// a successful transport outcome.
    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;
}

/// Production transport over a pooled reqwest client.
pub struct ReqwestTransport {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport rooted at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(|e| TransportError::Request { reason: e.to_string() })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request { reason: e.to_string() })?;

        Ok(HttpResponse { status, body })
    }
}
