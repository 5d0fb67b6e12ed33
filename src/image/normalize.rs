//! Normalization of provider image items into displayable sources.
//!
//! Providers return images in many loosely specified shapes. Each item is
//! first classified into an [`ImageItem`] by an ordered chain of checks, then
//! turned into an [`ImageSource`]. The precedence for object items is
//! `url` > `b64` > `base64` > `dataUrl` > `image.base64` | `image.b64`.

use crate::image::types::{is_http_url, ImageSource};
use serde_json::{Map, Value};

/// Returns the array under the first present key of `keys`, or an empty slice.
pub(crate) fn item_array<'a>(response: &'a Value, keys: &[&str]) -> &'a [Value] {
    let Some(obj) = response.as_object() else {
        return &[];
    };
    match keys.iter().find_map(|k| present(obj, k)) {
        Some(Value::Array(items)) => items,
        Some(other) => {
            tracing::debug!(kind = value_kind(other), "item field is not an array");
            &[]
        }
        None => &[],
    }
}

/// A provider image item, classified by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageItem<'a> {
    /// A string starting with `data:`.
    DataUri(&'a str),
    /// A string starting with `http://` or `https://`.
    Url(&'a str),
    /// Any other string, assumed to be raw base64 PNG data.
    RawBase64(&'a str),
    /// Object with a `url` field.
    UrlField(&'a str),
    /// Object with a `b64` field.
    B64Field(&'a str),
    /// Object with a `base64` field.
    Base64Field(&'a str),
    /// Object with a `dataUrl` field.
    DataUrlField(&'a str),
    /// Object with `image.base64` or `image.b64`.
    NestedImage(&'a str),
    /// Vendor wrapper with `image.image_bytes` (direct transport only).
    ImageBytes(&'a str),
    /// Nothing recognizable.
    Unknown,
}

impl<'a> ImageItem<'a> {
    /// Classifies a generic item (relay and fallback shapes).
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::String(s) if s.is_empty() => Self::Unknown,
            Value::String(s) if s.starts_with("data:") => Self::DataUri(s),
            Value::String(s) if is_http_url(s) => Self::Url(s),
            Value::String(s) => Self::RawBase64(s),
            Value::Object(obj) => Self::classify_object(obj),
            _ => Self::Unknown,
        }
    }

    /// Classifies a direct-vendor item, preferring the raw bytes wrapper.
    pub fn classify_vendor(value: &'a Value) -> Self {
        value
            .get("image")
            .and_then(|image| image.as_object())
            .and_then(|image| non_empty_str(image, "image_bytes"))
            .map(Self::ImageBytes)
            .unwrap_or_else(|| Self::classify(value))
    }

    fn classify_object(obj: &'a Map<String, Value>) -> Self {
        if let Some(url) = non_empty_str(obj, "url") {
            return Self::UrlField(url);
        }
        if let Some(b64) = non_empty_str(obj, "b64") {
            return Self::B64Field(b64);
        }
        if let Some(b64) = non_empty_str(obj, "base64") {
            return Self::Base64Field(b64);
        }
        if let Some(data_url) = non_empty_str(obj, "dataUrl") {
            return Self::DataUrlField(data_url);
        }
        let nested = obj
            .get("image")
            .and_then(|image| image.as_object())
            .and_then(|image| non_empty_str(image, "base64").or_else(|| non_empty_str(image, "b64")));
        match nested {
            Some(b64) => Self::NestedImage(b64),
            None => Self::Unknown,
        }
    }

    /// Converts the item into a displayable source.
    pub fn into_source(self) -> Option<ImageSource> {
        match self {
            Self::DataUri(s) | Self::Url(s) | Self::UrlField(s) | Self::DataUrlField(s) => {
                Some(ImageSource::passthrough(s))
            }
            Self::RawBase64(b64)
            | Self::B64Field(b64)
            | Self::Base64Field(b64)
            | Self::NestedImage(b64)
            | Self::ImageBytes(b64) => Some(ImageSource::from_base64(b64)),
            Self::Unknown => None,
        }
    }
}

/// Normalizes one provider item. Unrecognized shapes yield `None`.
pub fn normalize(item: &Value) -> Option<ImageSource> {
    let source = ImageItem::classify(item).into_source();
    if source.is_none() {
        tracing::debug!(kind = value_kind(item), "skipping unrecognized image item");
    }
    source
}

/// Normalizes a direct-vendor item, honoring `image.image_bytes` first.
pub(crate) fn normalize_vendor(item: &Value) -> Option<ImageSource> {
    let source = ImageItem::classify_vendor(item).into_source();
    if source.is_none() {
        tracing::debug!(kind = value_kind(item), "skipping unrecognized vendor image item");
    }
    source
}

/// Normalizes a batch, dropping unrecognized items and keeping order.
pub fn normalize_all(items: &[Value]) -> Vec<ImageSource> {
    items.iter().filter_map(normalize).collect()
}

/// A field counts as present when it is neither missing nor JSON null.
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
