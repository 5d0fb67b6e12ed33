//! Error types for image generation.

/// Errors that can occur while generating images.
#[derive(Debug, thiserror::Error)]
pub enum ImagenError {
    /// Input rejected before any network activity (empty prompt, missing key).
    #[error("invalid request: {0}")]
    Validation(String),

    /// Provider answered with a non-success HTTP status.
    #[error("transport error: {status} - {body}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// A request is already in flight on this controller.
    #[error("a generation request is already in progress")]
    Busy,

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImagenError {
    /// Returns the HTTP status for transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if the error was raised before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for image generation operations.
pub type Result<T> = std::result::Result<T, ImagenError>;
