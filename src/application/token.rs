//! Credential proxy: exchanges the server-held secret for a short-lived
//! session token from the upstream realtime voice API.

use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
    config::UpstreamSettings,
    infra::telemetry::{METRIC_TOKEN_FAILED, METRIC_TOKEN_ISSUED},
};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("upstream request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("upstream returned status {status}")]
    Status { status: u16 },
    #[error("upstream returned a non-JSON body: {0}")]
    MalformedBody(#[source] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    model: &'a str,
    voice: &'a str,
}

/// Issues session tokens against the upstream endpoint. Stateless apart from
/// the shared HTTP client; every call is an independent upstream exchange and
/// tokens are never cached server-side.
pub struct TokenService {
    client: reqwest::Client,
    sessions_url: Url,
    model: String,
    voice: String,
    api_key: Option<String>,
}

impl TokenService {
    pub fn new(settings: &UpstreamSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            sessions_url: settings.sessions_url.clone(),
            model: settings.model.clone(),
            voice: settings.voice.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    /// Request a fresh session token and return the upstream JSON body
    /// byte-for-byte. A missing secret is not rejected here; the request is
    /// simply sent unauthenticated and the upstream rejection surfaces as a
    /// status failure.
    pub async fn issue(&self) -> Result<Bytes, TokenError> {
        let body = SessionRequest {
            model: &self.model,
            voice: &self.voice,
        };

        let mut request = self.client.post(self.sessions_url.clone()).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let result = self.issue_inner(request).await;
        match &result {
            Ok(_) => counter!(METRIC_TOKEN_ISSUED).increment(1),
            Err(_) => counter!(METRIC_TOKEN_FAILED).increment(1),
        }
        result
    }

    async fn issue_inner(&self, request: reqwest::RequestBuilder) -> Result<Bytes, TokenError> {
        let response = request.send().await.map_err(TokenError::Request)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(TokenError::Request)?;

        if !status.is_success() {
            return Err(TokenError::Status {
                status: status.as_u16(),
            });
        }

        // The payload is relayed untouched, but it must at least be JSON.
        serde_json::from_slice::<serde_json::Value>(&bytes).map_err(TokenError::MalformedBody)?;

        Ok(bytes)
    }
}
