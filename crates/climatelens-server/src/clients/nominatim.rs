use async_trait::async_trait;
use climatelens_core::{Coordinates, Geocoder, ReportError, Result};
use serde::Deserialize;

const SERVICE: &str = "geocoder";

/// Forward geocoding against a Nominatim search endpoint.
#[derive(Clone)]
pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
}

#[derive(Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(http: reqwest::Client, base_url: &str, user_agent: impl Into<String>) -> Self {
        Self {
            http,
            base_url: super::base_url(base_url),
            user_agent: user_agent.into(),
        }
    }
}

/// First search hit, if any. Nominatim sends coordinates as strings.
fn first_hit(body: &str) -> Result<Option<Coordinates>> {
    let places: Vec<Place> = serde_json::from_str(body)
        .map_err(|e| ReportError::upstream(SERVICE, format!("malformed search result: {}", e)))?;
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|e| ReportError::upstream(SERVICE, format!("bad coordinate '{}': {}", s, e)))
    };
    Ok(Some(Coordinates::new(parse(&place.lat)?, parse(&place.lon)?)))
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>> {
        let resp = self
            .http
            .get(format!("{}/search", self.base_url))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| ReportError::upstream(SERVICE, format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ReportError::upstream(SERVICE, format!("HTTP {}", status)));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| ReportError::upstream(SERVICE, e))?;
        first_hit(&body)
    }
}
