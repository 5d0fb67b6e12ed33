//! Relay backend: accepts relay-mode requests and forwards them to the vendor
//! with a server-side API key, so browsers and CLIs never see the key.
//!
//! `POST /api/imagen4` takes `{ "prompt", "number_of_images", "aspect_ratio" }`
//! and answers `{ "images": [{ "b64": "..." } | { "url": "..." }] }`.
//! `GET /healthz` answers `ok`.

use crate::config::ImagenConfig;
use crate::error::{ImagenError, Result};
use crate::image::providers::DirectClient;
use crate::image::{AspectRatio, GenerationRequest, ImageSource, ImageTransport, MAX_COUNT, MIN_COUNT};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Shared state of the relay server.
pub struct RelayState {
    upstream: std::result::Result<Box<dyn ImageTransport>, String>,
}

impl RelayState {
    /// Forwards to `upstream`.
    pub fn new(upstream: impl ImageTransport + 'static) -> Self {
        Self {
            upstream: Ok(Box::new(upstream)),
        }
    }

    /// Forwards to the vendor endpoint from `config`, keyed by
    /// `AIHUBMIX_API_KEY`. A missing key does not stop the server; every
    /// generation request then fails with 500.
    pub fn from_config(config: &ImagenConfig) -> Self {
        let mut builder = DirectClient::builder().endpoint(&config.direct_endpoint);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        match builder.build() {
            Ok(client) => Self::new(client),
            Err(e) => {
                tracing::warn!(error = %e, "relay started without upstream credentials");
                Self {
                    upstream: Err("Missing AIHUBMIX_API_KEY environment variable".into()),
                }
            }
        }
    }
}

/// Builds the relay router.
pub fn router(state: Arc<RelayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/imagen4", post(generate_handler))
        .route("/healthz", get(health_handler))
        .layer(cors)
        .with_state(state)
}

/// Serves the relay on `listener` until the process exits.
pub async fn serve(listener: TcpListener, state: RelayState) -> Result<()> {
    tracing::info!(addr = ?listener.local_addr().ok(), "relay listening");
    axum::serve(listener, router(Arc::new(state))).await?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "ok"
}

#[derive(Debug, Default, Deserialize)]
struct RelayPayload {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    aspect_ratio: Option<String>,
    #[serde(default)]
    number_of_images: Option<Value>,
}

async fn generate_handler(
    State(state): State<Arc<RelayState>>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    // Unparseable bodies are treated as empty, which fails prompt validation.
    let payload: RelayPayload = serde_json::from_slice(&body).unwrap_or_default();

    let request = match parse_payload(payload) {
        Ok(request) => request,
        Err(message) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))),
    };

    let upstream = match &state.upstream {
        Ok(upstream) => upstream,
        Err(message) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
        }
    };

    match upstream.request_images(&request).await {
        Ok(sources) => {
            tracing::info!(
                images = sources.len(),
                count = request.count(),
                "relayed generation request"
            );
            let images: Vec<Value> = sources.iter().map(relay_item).collect();
            (StatusCode::OK, Json(json!({ "images": images })))
        }
        Err(e) => {
            tracing::error!(error = %e, "relay upstream failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

fn parse_payload(payload: RelayPayload) -> std::result::Result<GenerationRequest, String> {
    let prompt = payload.prompt.unwrap_or_default();
    if prompt.trim().is_empty() {
        return Err("prompt is required".into());
    }

    let aspect_ratio = match payload.aspect_ratio.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<AspectRatio>().map_err(|e| match e {
            ImagenError::Validation(msg) => msg,
            other => other.to_string(),
        })?,
        None => AspectRatio::Square,
    };

    // Missing, null, an empty string or a literal zero means one image.
    // Anything else is truncated toward zero and range checked.
    let count = match payload.number_of_images {
        None | Some(Value::Null) => 1,
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => 1,
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) if s.is_empty() => 1,
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| "number_of_images must be an integer".to_string())?,
        Some(_) => return Err("number_of_images must be an integer".into()),
    };
    if !(MIN_COUNT as i64..=MAX_COUNT as i64).contains(&count) {
        return Err(format!("number_of_images must be {MIN_COUNT}..{MAX_COUNT}"));
    }

    Ok(GenerationRequest::new(prompt)
        .with_aspect_ratio(aspect_ratio)
        .with_count(count))
}

fn relay_item(source: &ImageSource) -> Value {
    match source.as_str().strip_prefix("data:image/png;base64,") {
        Some(b64) => json!({ "b64": b64 }),
        None if source.is_data_uri() => json!({ "dataUrl": source.as_str() }),
        None => json!({ "url": source.as_str() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(value: Value) -> RelayPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_prompt_is_required() {
        assert_eq!(
            parse_payload(payload(json!({"prompt": "  "}))).unwrap_err(),
            "prompt is required"
        );
        assert_eq!(
            parse_payload(RelayPayload::default()).unwrap_err(),
            "prompt is required"
        );
    }

    #[test]
    fn test_defaults() {
        let req = parse_payload(payload(json!({"prompt": "a cat"}))).unwrap();
        assert_eq!(req.count(), 1);
        assert_eq!(req.aspect_ratio(), AspectRatio::Square);

        let req = parse_payload(payload(json!({"prompt": "a cat", "number_of_images": 0}))).unwrap();
        assert_eq!(req.count(), 1);
    }

    #[test]
    fn test_count_is_range_checked() {
        let err = parse_payload(payload(json!({"prompt": "a", "number_of_images": 5}))).unwrap_err();
        assert_eq!(err, "number_of_images must be 1..4");
        assert!(parse_payload(payload(json!({"prompt": "a", "number_of_images": -1}))).is_err());
        assert!(parse_payload(payload(json!({"prompt": "a", "number_of_images": "x"}))).is_err());

        let req = parse_payload(payload(json!({"prompt": "a", "number_of_images": "3"}))).unwrap();
        assert_eq!(req.count(), 3);
    }

    #[test]
    fn test_only_literal_zero_defaults_to_one() {
        let req = parse_payload(payload(json!({"prompt": "a", "number_of_images": 0.0}))).unwrap();
        assert_eq!(req.count(), 1);
        let req = parse_payload(payload(json!({"prompt": "a", "number_of_images": ""}))).unwrap();
        assert_eq!(req.count(), 1);

        let err = parse_payload(payload(json!({"prompt": "a", "number_of_images": -0.5}))).unwrap_err();
        assert_eq!(err, "number_of_images must be 1..4");
        let err = parse_payload(payload(json!({"prompt": "a", "number_of_images": 0.5}))).unwrap_err();
        assert_eq!(err, "number_of_images must be 1..4");
        let err = parse_payload(payload(json!({"prompt": "a", "number_of_images": "0"}))).unwrap_err();
        assert_eq!(err, "number_of_images must be 1..4");

        let req = parse_payload(payload(json!({"prompt": "a", "number_of_images": 2.7}))).unwrap();
        assert_eq!(req.count(), 2);
    }

    #[test]
    fn test_aspect_ratio() {
        let req = parse_payload(payload(json!({"prompt": "a", "aspect_ratio": "16:9"}))).unwrap();
        assert_eq!(req.aspect_ratio(), AspectRatio::Landscape);

        let err = parse_payload(payload(json!({"prompt": "a", "aspect_ratio": "7:5"}))).unwrap_err();
        assert!(err.contains("7:5"));
    }

    #[test]
    fn test_relay_item_shapes() {
        assert_eq!(
            relay_item(&ImageSource::from_base64("AAA")),
            json!({"b64": "AAA"})
        );
        assert_eq!(
            relay_item(&ImageSource::passthrough("https://cdn/x.png")),
            json!({"url": "https://cdn/x.png"})
        );
        assert_eq!(
            relay_item(&ImageSource::passthrough("data:image/jpeg;base64,/9j/")),
            json!({"dataUrl": "data:image/jpeg;base64,/9j/"})
        );
    }
}
