//! Image transports.

mod direct;
mod relay;

pub use direct::{DirectClient, DirectClientBuilder, DIRECT_URL};
pub use relay::{RelayClient, RelayClientBuilder, DEFAULT_RELAY_URL};

use crate::error::Result;
use std::time::Duration;

/// Builds the HTTP client used by a transport, unless one was supplied.
pub(crate) fn http_client(
    client: Option<reqwest::Client>,
    timeout: Option<Duration>,
) -> Result<reqwest::Client> {
    if let Some(client) = client {
        return Ok(client);
    }
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}
