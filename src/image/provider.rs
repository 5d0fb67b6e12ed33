//! Transport trait shared by the relay and direct clients.

use crate::error::{ImagenError, Result};
use crate::image::types::{GenerationRequest, ImageSource, TransportMode};
use async_trait::async_trait;
use serde_json::Value;

/// A way of getting images from the provider.
#[async_trait]
pub trait ImageTransport: Send + Sync {
    /// Sends the request and returns the normalized images in provider order.
    ///
    /// An empty vector is a valid answer. Bodies that are not JSON, or that
    /// carry no recognizable item array, also produce an empty vector.
    async fn request_images(&self, request: &GenerationRequest) -> Result<Vec<ImageSource>>;

    /// Returns the transport mode this client implements.
    fn mode(&self) -> TransportMode;

    /// Returns the name of this transport for display.
    fn name(&self) -> &str {
        match self.mode() {
            TransportMode::Relay => "Imagen 4 (relay)",
            TransportMode::Direct => "Imagen 4 (direct)",
        }
    }
}

/// Reads the body of a finished exchange.
///
/// Non-success statuses become [`ImagenError::Transport`] carrying the raw
/// body. A success body that is not JSON is logged and read as `Null`.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ImagenError::Transport {
            status: status.as_u16(),
            body: text,
        });
    }

    match serde_json::from_str(&text) {
        Ok(json) => Ok(json),
        Err(e) => {
            tracing::warn!(error = %e, body_len = text.len(), "response body is not valid JSON");
            Ok(Value::Null)
        }
    }
}

/// Top-level keys of a response object, for diagnostics.
pub(crate) fn response_keys(json: &Value) -> Vec<&str> {
    json.as_object()
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default()
}
