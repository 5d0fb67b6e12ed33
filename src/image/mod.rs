//! Image generation module.

pub mod normalize;
mod provider;
pub mod providers;
mod types;

pub use normalize::{normalize, normalize_all, ImageItem};
pub use provider::ImageTransport;
pub use types::{
    clamp_count, AspectRatio, GenerationOutcome, GenerationRequest, ImageSource, TransportMode,
    MAX_COUNT, MIN_COUNT,
};
