use super::traits::CompletionProvider;
use super::types::ChatMessage;
use crate::config::PolicySettings;
use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

const MAX_API_ERROR_CHARS: usize = 200;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    /// Pre-computed `"Bearer <key>"` header value (avoids `format!` per request).
    cached_auth_header: String,
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        Self {
            cached_auth_header: format!("Bearer {api_key}"),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(std::time::Duration::from_secs(90))
                .tcp_keepalive(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Construct a provider using the model named in [`PolicySettings`].
    pub fn from_settings(api_key: &str, settings: &PolicySettings) -> Self {
        Self::new(api_key, settings.model.clone())
    }

    /// Point the provider at a different endpoint (test servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_json(&self, messages: &[ChatMessage], temperature: f64) -> anyhow::Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", &self.cached_auth_header)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("openai response was not valid JSON")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(content)
    }
}

impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete_json<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move { self.request_json(messages, temperature).await })
    }
}

/// Build a sanitized provider error from a failed HTTP response.
///
/// Error bodies are truncated and bearer tokens are masked so provider
/// failures can be logged without leaking credentials.
async fn api_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    anyhow::anyhow!("openai API error ({status}): {}", sanitize_api_error(&body))
}

fn sanitize_api_error(input: &str) -> String {
    let mut scrubbed = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find("Bearer ") {
        let token_start = idx + "Bearer ".len();
        scrubbed.push_str(&rest[..token_start]);
        scrubbed.push_str("[REDACTED]");
        let tail = &rest[token_start..];
        let token_len = tail
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .unwrap_or(tail.len());
        rest = &tail[token_len..];
    }
    scrubbed.push_str(rest);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }
    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &scrubbed[..end])
}
