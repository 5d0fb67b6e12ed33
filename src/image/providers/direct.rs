//! Direct transport: requests go straight to the Imagen 4 vendor endpoint.
//!
//! The request and response schema used here are inferred from public
//! documentation of the `generateImages` API and may drift. Everything that
//! depends on that schema stays in this module.

use crate::error::{ImagenError, Result};
use crate::image::normalize::{item_array, normalize_vendor};
use crate::image::provider::{read_body, response_keys, ImageTransport};
use crate::image::types::{GenerationRequest, ImageSource, TransportMode};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;

/// Vendor endpoint for Imagen 4 Fast.
pub const DIRECT_URL: &str =
    "https://aihubmix.com/gemini/v1beta/models/imagen-4.0-fast-generate-001:generateImages";

const ITEM_KEYS: [&str; 3] = ["generated_images", "images", "results"];

/// Builder for DirectClient.
#[derive(Debug, Default)]
pub struct DirectClientBuilder {
    api_key: Option<SecretString>,
    endpoint: Option<String>,
    timeout: Option<Duration>,
    client: Option<reqwest::Client>,
}

impl DirectClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `AIHUBMIX_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Overrides the vendor endpoint. Falls back to `IMAGEN_DIRECT_URL`, then
    /// [`DIRECT_URL`].
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

    /// Builds the client, resolving the API key.
    pub fn build(self) -> Result<DirectClient> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("AIHUBMIX_API_KEY").ok().map(SecretString::from))
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| {
                ImagenError::Validation("an API key is required for direct mode".into())
            })?;

        let endpoint = self
            .endpoint
            .or_else(|| std::env::var("IMAGEN_DIRECT_URL").ok())
            .unwrap_or_else(|| DIRECT_URL.to_string());

        Ok(DirectClient {
            client: super::http_client(self.client, self.timeout)?,
            api_key,
            endpoint,
        })
    }
}

/// Client for the vendor's `generateImages` endpoint.
pub struct DirectClient {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
}

impl DirectClient {
    /// Creates a new `DirectClientBuilder`.
    pub fn builder() -> DirectClientBuilder {
        DirectClientBuilder::new()
    }

    /// Returns the endpoint requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ImageTransport for DirectClient {
    async fn request_images(&self, request: &GenerationRequest) -> Result<Vec<ImageSource>> {
        let body = DirectRequest::from_generation_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret().trim()),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let json = read_body(response).await?;
        tracing::debug!(keys = ?response_keys(&json), "direct response received");

        let sources: Vec<ImageSource> = item_array(&json, &ITEM_KEYS)
            .iter()
            .filter_map(normalize_vendor)
            .collect();

        if sources.is_empty() {
            tracing::warn!(response = %json, "no images recognized in vendor response");
        }

        Ok(sources)
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Direct
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectRequest<'a> {
    prompt: &'a str,
    number_of_images: u32,
    aspect_ratio: &'static str,
}

impl<'a> DirectRequest<'a> {
    fn from_generation_request(req: &'a GenerationRequest) -> Self {
        Self {
            prompt: req.prompt(),
            number_of_images: req.count(),
            aspect_ratio: req.aspect_ratio().as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::AspectRatio;

    #[test]
    fn test_builder_with_explicit_key() {
        let client = DirectClientBuilder::new().api_key("sk-test").build();
        assert!(client.is_ok());
        assert_eq!(client.unwrap().endpoint(), DIRECT_URL);
    }

    #[test]
    fn test_builder_rejects_blank_key() {
        let err = DirectClientBuilder::new().api_key("   ").build().err().unwrap();
        assert!(err.is_validation());
    }

    #[test]
    fn test_builder_endpoint_override() {
        let client = DirectClientBuilder::new()
            .api_key("sk-test")
            .endpoint("http://localhost:9/generate")
            .build()
            .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/generate");
        assert_eq!(client.mode(), TransportMode::Direct);
        assert_eq!(client.name(), "Imagen 4 (direct)");
    }

    #[test]
    fn test_request_serialization_uses_camel_case() {
        let req = GenerationRequest::new("A fox")
            .with_aspect_ratio(AspectRatio::Portrait)
            .with_count(2);
        let json = serde_json::to_value(DirectRequest::from_generation_request(&req)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "prompt": "A fox",
                "numberOfImages": 2,
                "aspectRatio": "9:16",
            })
        );
        assert!(json.get("number_of_images").is_none());
    }
}
