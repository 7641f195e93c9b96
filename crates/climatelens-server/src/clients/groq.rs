use async_trait::async_trait;
use climatelens_core::{NarrativeContext, NarrativeService, ReportError, Result};
use serde::{Deserialize, Serialize};

/// Narrative author using an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct GroqNarrator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqNarrator {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            http,
            base_url: super::base_url(base_url),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }
}

/// First choice's message text, trimmed.
fn first_message(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ReportError::NarrativeServiceFailed(format!("malformed completion: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ReportError::NarrativeServiceFailed("completion has no content".into()))
}

#[async_trait]
impl NarrativeService for GroqNarrator {
    async fn generate(&self, context: &NarrativeContext) -> Result<String> {
        let prompt = context.render_prompt();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.temperature,
        };

        tracing::info!(model = %self.model, charts = context.charts.len(), "Requesting narrative");
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReportError::NarrativeServiceFailed(format!("request failed: {}", e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ReportError::NarrativeServiceFailed(format!("reading response: {}", e)))?;
        if !status.is_success() {
            return Err(ReportError::NarrativeServiceFailed(format!("HTTP {}: {}", status, body)));
        }
        first_message(&body)
    }
}
