#![warn(missing_docs)]
//! Imagen - Imagen 4 image generation through a relay or straight from the vendor.
//!
//! Requests go either through an operator-controlled relay backend, or
//! directly to the vendor with a user-supplied API key. Whatever shape the
//! provider answers with, results come back as [`ImageSource`]s: PNG data
//! URIs or absolute URLs, ready to display.
//!
//! # Quick Start
//!
//! ```no_run
//! use imagen::{AspectRatio, GenerationController, GenerationRequest, TransportMode};
//!
//! #[tokio::main]
//! async fn main() -> imagen::Result<()> {
//!     let controller = GenerationController::from_env()?;
//!     let request = GenerationRequest::new("A lighthouse at dusk, oil painting")
//!         .with_aspect_ratio(AspectRatio::Landscape)
//!         .with_count(2);
//!     let outcome = controller.submit(&request, TransportMode::Relay).await?;
//!     for (i, source) in outcome.sources.iter().enumerate() {
//!         if source.is_data_uri() {
//!             source.save(format!("out_{i}.png"))?;
//!         }
//!     }
//!     println!("{}", outcome.summary());
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `server`: the relay backend (`imagen serve`)
//! - `cli`: the `imagen` command-line interface (default)

mod config;
pub mod controller;
pub mod credential;
mod error;
pub mod image;

#[cfg(feature = "server")]
pub mod server;

pub use config::ImagenConfig;
pub use controller::{ControllerState, FailureReport, GenerationController};
pub use credential::{CredentialBackend, CredentialStore, FileBackend, MemoryBackend, PersistenceStatus};
pub use error::{ImagenError, Result};
pub use image::providers::{DirectClient, DirectClientBuilder, RelayClient, RelayClientBuilder};
pub use image::{
    normalize, AspectRatio, GenerationOutcome, GenerationRequest, ImageItem, ImageSource,
    ImageTransport, TransportMode,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::controller::GenerationController;
    pub use crate::credential::CredentialStore;
    pub use crate::error::{ImagenError, Result};
    pub use crate::image::{
        AspectRatio, GenerationOutcome, GenerationRequest, ImageSource, ImageTransport,
        TransportMode,
    };
}
