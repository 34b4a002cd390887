//! Chat completion client for the LLM-backed step agents.
//!
//! Calls any OpenAI-compatible chat completions API directly over HTTP:
//!
//! POST {base_url}/chat/completions
//! Headers:
//!   Authorization: Bearer {api_key}
//!   content-type: application/json
//!
//! Configuration comes from the environment (`DEALFLOW_BASE_URL`,
//! `DEALFLOW_API_KEY` falling back to `OPENAI_API_KEY`, `DEALFLOW_MODEL`).
//! Provider failures surface as `ServerError::Generation` — the orchestrator
//! reports them on the progress stream, never retries on its own.

use serde::Deserialize;

use crate::error::ServerError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const MAX_COMPLETION_TOKENS: u32 = 16000;

/// Configuration for the chat completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API base URL (without the `/chat/completions` suffix).
    pub base_url: String,
    /// API key / auth token.
    pub api_key: String,
    /// Model ID.
    pub model: String,
    /// Temperature; `None` uses the provider default.
    pub temperature: Option<f64>,
}

impl LlmConfig {
    /// Resolve configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("DEALFLOW_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: std::env::var("DEALFLOW_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .unwrap_or_default(),
            model: std::env::var("DEALFLOW_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Calls an OpenAI-compatible chat completions API.
pub struct ChatClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(300)) // 5 min timeout
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(LlmConfig::from_env())
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Run one chat completion and return the assistant's text.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ServerError> {
        self.complete_inner(system_prompt, user_prompt, false).await
    }

    /// Run one chat completion with JSON output enforced and parse the
    /// assistant's reply as a JSON value.
    pub async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<serde_json::Value, ServerError> {
        let content = self.complete_inner(system_prompt, user_prompt, true).await?;
        serde_json::from_str(&content)
            .map_err(|e| ServerError::Generation(format!("Model returned invalid JSON: {}", e)))
    }

    async fn complete_inner(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        json_mode: bool,
    ) -> Result<String, ServerError> {
        if self.config.api_key.is_empty() {
            return Err(ServerError::Generation(
                "No API key configured. Set DEALFLOW_API_KEY or OPENAI_API_KEY.".to_string(),
            ));
        }

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut messages = vec![];
        if !system_prompt.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system_prompt
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": user_prompt
        }));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_completion_tokens": MAX_COMPLETION_TOKENS,
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = serde_json::Value::Number(
                serde_json::Number::from_f64(temp).unwrap_or_else(|| serde_json::Number::from(0)),
            );
        }
        if json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        tracing::info!(
            "[ChatClient] Calling chat completions: {} (model: {})",
            url,
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ServerError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| ServerError::Generation(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(ServerError::Generation(format!(
                "API returned {}: {}",
                status, response_text
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| ServerError::Generation(format!("Failed to parse response JSON: {}", e)))?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ServerError::Generation(
                "Model returned an empty response".to_string(),
            ));
        }

        tracing::debug!(
            "[ChatClient] Received {} chars from {}",
            content.len(),
            parsed.model.as_deref().unwrap_or(&self.config.model)
        );

        Ok(content)
    }
}
