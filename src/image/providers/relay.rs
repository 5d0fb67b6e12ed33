//! Relay transport: requests go through an operator-controlled backend.

use crate::error::{ImagenError, Result};
use crate::image::normalize::{item_array, normalize_all};
use crate::image::provider::{read_body, response_keys, ImageTransport};
use crate::image::types::{GenerationRequest, ImageSource, TransportMode};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Endpoint used when none is configured (the bundled relay server).
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:5001/api/imagen4";

const ITEM_KEYS: [&str; 3] = ["images", "results", "data"];

/// Builder for RelayClient.
#[derive(Debug, Clone, Default)]
pub struct RelayClientBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
    client: Option<reqwest::Client>,
}

impl RelayClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relay endpoint. Falls back to `IMAGEN_RELAY_URL`, then
    /// [`DEFAULT_RELAY_URL`].
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Bounds each request. No timeout by default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reuses an existing HTTP client. Its own timeout applies.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Builds the client, resolving the endpoint.
    pub fn build(self) -> Result<RelayClient> {
        let endpoint = self
            .endpoint
            .or_else(|| std::env::var("IMAGEN_RELAY_URL").ok())
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string())
            .trim()
            .to_string();

        if endpoint.is_empty() {
            return Err(ImagenError::Validation("relay endpoint is required".into()));
        }

        Ok(RelayClient {
            client: super::http_client(self.client, self.timeout)?,
            endpoint,
        })
    }
}

/// Client for the operator's relay backend.
///
/// The endpoint is trusted as given; no allowlist is applied.
pub struct RelayClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayClient {
    /// Creates a new `RelayClientBuilder`.
    pub fn builder() -> RelayClientBuilder {
        RelayClientBuilder::new()
    }

    /// Returns the endpoint requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ImageTransport for RelayClient {
    async fn request_images(&self, request: &GenerationRequest) -> Result<Vec<ImageSource>> {
        let body = RelayRequest::from_generation_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let json = read_body(response).await?;
        tracing::debug!(keys = ?response_keys(&json), "relay response received");

        Ok(normalize_all(item_array(&json, &ITEM_KEYS)))
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Relay
    }
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    prompt: &'a str,
    aspect_ratio: &'static str,
    number_of_images: u32,
}

impl<'a> RelayRequest<'a> {
    fn from_generation_request(req: &'a GenerationRequest) -> Self {
        Self {
            prompt: req.prompt(),
            aspect_ratio: req.aspect_ratio().as_str(),
            number_of_images: req.count(),
        }
    }
}
