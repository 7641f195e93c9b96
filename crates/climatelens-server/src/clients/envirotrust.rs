use async_trait::async_trait;
use climatelens_core::{Coordinates, Dataset, DatasetKind, ReportError, Result, RiskDataProvider};

const SERVICE: &str = "envirotrust";

/// Risk-data provider backed by the EnviroTrust REST API.
#[derive(Clone)]
pub struct EnviroTrustClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EnviroTrustClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: super::base_url(base_url),
            api_key: api_key.into(),
        }
    }

    fn url(&self, kind: DatasetKind) -> String {
        format!("{}{}", self.base_url, kind.endpoint())
    }
}

#[async_trait]
impl RiskDataProvider for EnviroTrustClient {
    async fn fetch(&self, kind: DatasetKind, at: Coordinates) -> Result<Dataset> {
        tracing::debug!(dataset = %kind, "GET {}", kind.endpoint());
        let resp = self
            .http
            .get(self.url(kind))
            .header("x-api-key", &self.api_key)
            .query(&[("latitude", at.latitude), ("longitude", at.longitude)])
            .send()
            .await
            .map_err(|e| ReportError::upstream(SERVICE, format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReportError::upstream(
                SERVICE,
                format!("HTTP {}: {}", status, truncate(&body, 200)),
            ));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ReportError::upstream(SERVICE, format!("non-JSON response: {}", e)))?;
        Dataset::from_json(kind, value)
            .map_err(|e| ReportError::upstream(SERVICE, format!("unexpected {} payload: {}", kind, e)))
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}
