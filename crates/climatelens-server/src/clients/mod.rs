//! HTTP clients for the three upstream services.

mod envirotrust;
mod groq;
mod nominatim;

pub use envirotrust::EnviroTrustClient;
pub use groq::GroqNarrator;
pub use nominatim::NominatimGeocoder;

use std::time::Duration;

/// Shared connection pool. Per-call deadlines are enforced by the pipeline;
/// this is only a backstop for hung connections.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    Ok(client)
}

/// Trim a base URL so paths can be appended with a leading slash.
pub(crate) fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
