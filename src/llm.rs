//! LLM completion providers.
//!
//! The pipeline talks to an abstract [`CompletionProvider`]: system prompt and
//! user prompt in, text out. Two backends implement it (OpenAI-compatible
//! chat completions and the Anthropic Messages API), selected once at
//! construction from configuration, never by string dispatch at call sites.
//!
//! Providers classify HTTP failures into [`Error::Api`] so the retry layer
//! can tell rate limits and server errors apart from client mistakes.

use crate::config::{Config, Provider};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// Request timeout for completion calls. Generation is slow; this is far
/// looser than the 30s used for ordinary REST calls.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

/// Cap on a single response, matching the scale of a five-point summary or a
/// ~1600-character digest.
const MAX_COMPLETION_TOKENS: u32 = 2048;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// One completion request: system + user prompt in, generated text out.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> Result<String>;

    fn name(&self) -> &'static str;
}

/// Build the configured provider.
pub fn provider_from_config(config: &Config) -> Result<Box<dyn CompletionProvider>> {
    let http = reqwest::Client::builder()
        .timeout(COMPLETION_TIMEOUT)
        .build()?;

    match config.provider {
        Provider::OpenAi => {
            let api_key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| Error::Config("OPENAI_API_KEY is required".to_string()))?;
            Ok(Box::new(OpenAiProvider {
                http,
                api_key,
                model: config.openai_model.clone(),
                base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            }))
        }
        Provider::Anthropic => {
            let api_key = config
                .anthropic_api_key
                .clone()
                .ok_or_else(|| Error::Config("ANTHROPIC_API_KEY is required".to_string()))?;
            Ok(Box::new(AnthropicProvider {
                http,
                api_key,
                model: config.anthropic_model.clone(),
            }))
        }
    }
}

/// Read an error body for logging, trimmed to keep log lines sane.
async fn error_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 300 {
        body.truncate(300);
        body.push('…');
    }
    body
}

// ---- OpenAI-compatible chat completions ----

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        if let Some(t) = temperature {
            body["temperature"] = json!(t);
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_body(response).await;
            warn!(%status, %message, "OpenAI completion failed");
            return Err(Error::Api {
                service: "openai",
                status,
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(Error::EmptyCompletion)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ---- Anthropic Messages API ----

pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "system": system,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "temperature": temperature.unwrap_or(0.7),
            "messages": [
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_body(response).await;
            warn!(%status, %message, "Anthropic completion failed");
            return Err(Error::Api {
                service: "anthropic",
                status,
                message,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .filter(|text| !text.is_empty())
            .ok_or(Error::EmptyCompletion)
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_messages_response_parsing() {
        let raw = r#"{"content":[{"type":"text","text":"hi there"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text.as_deref(), Some("hi there"));
    }

    #[test]
    fn test_messages_response_skips_non_text_blocks() {
        let raw = r#"{"content":[{"type":"thinking"},{"type":"text","text":"answer"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let text = parsed.content.into_iter().find_map(|b| b.text);
        assert_eq!(text.as_deref(), Some("answer"));
    }
}
