//! Core types for image generation.

use crate::error::{ImagenError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Smallest number of images a single request may ask for.
pub const MIN_COUNT: u32 = 1;
/// Largest number of images a single request may ask for.
pub const MAX_COUNT: u32 = 4;

const DATA_URI_PNG_PREFIX: &str = "data:image/png;base64,";

/// Aspect ratios accepted by Imagen 4.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1 square aspect ratio.
    #[default]
    #[serde(rename = "1:1")]
    Square,
    /// 3:4 portrait aspect ratio.
    #[serde(rename = "3:4")]
    StandardPortrait,
    /// 4:3 landscape aspect ratio.
    #[serde(rename = "4:3")]
    Standard,
    /// 9:16 tall portrait aspect ratio.
    #[serde(rename = "9:16")]
    Portrait,
    /// 16:9 widescreen aspect ratio.
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    /// All supported ratios, in display order.
    pub const ALL: [AspectRatio; 5] = [
        Self::Square,
        Self::StandardPortrait,
        Self::Standard,
        Self::Portrait,
        Self::Landscape,
    ];

    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::StandardPortrait => "3:4",
            Self::Standard => "4:3",
            Self::Portrait => "9:16",
            Self::Landscape => "16:9",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = ImagenError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|ar| ar.as_str() == s)
            .ok_or_else(|| ImagenError::Validation(format!("unsupported aspect ratio: {s}")))
    }
}

/// How a request reaches the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Through the operator-controlled backend.
    #[default]
    Relay,
    /// Straight to the vendor with the user's API key.
    Direct,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relay => write!(f, "relay"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// A request to generate images.
///
/// Built once per submission and never mutated afterwards. The prompt is
/// stored trimmed and the count is always within [`MIN_COUNT`]..=[`MAX_COUNT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    aspect_ratio: AspectRatio,
    count: u32,
}

impl GenerationRequest {
    /// Creates a new request for one square image.
    pub fn new(prompt: impl AsRef<str>) -> Self {
        Self {
            prompt: prompt.as_ref().trim().to_string(),
            aspect_ratio: AspectRatio::default(),
            count: MIN_COUNT,
        }
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Sets the number of images. Out-of-range values are clamped, not rejected.
    pub fn with_count(mut self, count: i64) -> Self {
        self.count = clamp_count(count);
        self
    }

    /// The trimmed prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The requested aspect ratio.
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// The number of images to generate.
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Clamps an arbitrary image count into the supported range.
pub fn clamp_count(count: i64) -> u32 {
    count.clamp(MIN_COUNT as i64, MAX_COUNT as i64) as u32
}

/// A displayable image: a PNG data URI or an absolute http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageSource(String);

impl ImageSource {
    /// Wraps raw base64 PNG data as a data URI.
    pub(crate) fn from_base64(payload: &str) -> Self {
        Self(format!("{DATA_URI_PNG_PREFIX}{payload}"))
    }

    /// Keeps an already displayable value (data URI or URL) as is.
    pub(crate) fn passthrough(value: &str) -> Self {
        Self(value.to_string())
    }

    /// Returns the source string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the source, returning the string.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns true for `data:` URIs.
    pub fn is_data_uri(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Returns true for absolute http(s) URLs.
    pub fn is_url(&self) -> bool {
        is_http_url(&self.0)
    }

    /// Returns the base64 payload of a data URI.
    pub fn base64_payload(&self) -> Option<&str> {
        if !self.is_data_uri() {
            return None;
        }
        self.0.find(";base64,").map(|pos| &self.0[pos + 8..])
    }

    /// Decodes the image bytes carried by a data URI.
    pub fn decode(&self) -> Result<Vec<u8>> {
        use base64::Engine;

        let payload = self
            .base64_payload()
            .ok_or_else(|| ImagenError::Decode("image source is not a base64 data URI".into()))?;
        let cleaned: String = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned))
            .map_err(|e| ImagenError::Decode(e.to_string()))
    }

    /// File name used when saving the `index`-th image of a batch.
    pub fn file_name(index: usize, stamp: u128) -> String {
        format!("imagen4_{}_{}.png", stamp, index + 1)
    }

    /// Decodes a data URI and writes it to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.decode()?)?;
        Ok(())
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ImageSource {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub(crate) fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// The result of one successful submission.
#[derive(Debug, Clone)]
#[must_use = "generated images should be displayed or saved"]
pub struct GenerationOutcome {
    /// Images in provider order.
    pub sources: Vec<ImageSource>,
    /// Wall time spent on the request.
    pub elapsed: Duration,
    /// Transport the request went through.
    pub mode: TransportMode,
}

impl GenerationOutcome {
    /// Elapsed time in seconds.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Returns true if the provider returned no usable image.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// One-line status, e.g. `completed: 2 image(s) · 3.14s`.
    pub fn summary(&self) -> String {
        format!(
            "completed: {} image(s) · {:.2}s",
            self.sources.len(),
            self.elapsed_seconds()
        )
    }
}
