//! Runtime configuration, resolved from the environment.

use crate::image::providers::{DEFAULT_RELAY_URL, DIRECT_URL};
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by the controller, the CLI and the relay server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagenConfig {
    /// Relay backend endpoint.
    pub relay_endpoint: String,
    /// Vendor endpoint for direct mode.
    pub direct_endpoint: String,
    /// Per-request timeout. `None` waits as long as the server does.
    pub timeout: Option<Duration>,
    /// File holding the remembered API key. `None` uses the platform default.
    pub credential_path: Option<PathBuf>,
}

impl Default for ImagenConfig {
    fn default() -> Self {
        Self {
            relay_endpoint: DEFAULT_RELAY_URL.to_string(),
            direct_endpoint: DIRECT_URL.to_string(),
            timeout: None,
            credential_path: None,
        }
    }
}

impl ImagenConfig {
    /// Reads `IMAGEN_RELAY_URL`, `IMAGEN_DIRECT_URL`, `IMAGEN_TIMEOUT_SECS`
    /// and `IMAGEN_CREDENTIAL_FILE`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let timeout = non_empty("IMAGEN_TIMEOUT_SECS").and_then(|v| match v.trim().parse::<u64>() {
            Ok(0) => None,
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(e) => {
                tracing::warn!(value = %v, error = %e, "ignoring invalid IMAGEN_TIMEOUT_SECS");
                None
            }
        });

        Self {
            relay_endpoint: non_empty("IMAGEN_RELAY_URL").unwrap_or(defaults.relay_endpoint),
            direct_endpoint: non_empty("IMAGEN_DIRECT_URL").unwrap_or(defaults.direct_endpoint),
            timeout,
            credential_path: non_empty("IMAGEN_CREDENTIAL_FILE").map(PathBuf::from),
        }
    }

    /// Sets the relay endpoint.
    pub fn with_relay_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.relay_endpoint = endpoint.into();
        self
    }

    /// Sets the direct-mode endpoint.
    pub fn with_direct_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.direct_endpoint = endpoint.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
