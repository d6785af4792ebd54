//! OpenAI-compatible adapter.
//!
//! Covers any endpoint speaking the `chat/completions` streaming dialect
//! (OpenAI, Ollama, vLLM, LM Studio, ...): deltas arrive per-choice, the
//! stream ends with a `[DONE]` sentinel, and usage is requested via
//! `stream_options.include_usage`.

use serde_json::Value;

use sw_domain::config::ProviderConfig;
use sw_domain::error::{Error, Result};
use sw_domain::session::{Role, Session};
use sw_domain::stream::{BoxStream, Chunk, TokenUsage};

use crate::sse::sse_response_stream;
use crate::traits::StreamingClient;
use crate::util::{from_reqwest, resolve_api_key};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// A streaming client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiCompatClient {
    id: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new client from the deserialized provider config.
    ///
    /// Local endpoints often need no API key, so key resolution failure is
    /// tolerated here (the request is sent without authorization).
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = match resolve_api_key(config) {
            Ok(key) => Some(key),
            Err(e) => {
                if config.api_key.is_some() || config.api_key_env.is_some() {
                    return Err(e);
                }
                tracing::debug!(provider = %config.id, "no API key configured, sending unauthenticated");
                None
            }
        };
        let model = config
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.into());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: config.id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_output_tokens: config.max_output_tokens,
            client,
        })
    }

    fn build_body(&self, session: &Session) -> Value {
        let mut messages: Vec<Value> = Vec::with_capacity(session.messages.len() + 1);
        if !session.system_prompt.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": session.system_prompt,
            }));
        }
        for m in &session.messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": m.content }));
        }

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_output_tokens,
            "stream": true,
            "stream_options": { "include_usage": true },
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decode one OpenAI-style SSE data payload into zero or more chunks.
fn parse_openai_sse(data: &str) -> Vec<Result<Chunk>> {
    if data == "[DONE]" {
        return vec![Ok(Chunk::MessageStop)];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let mut chunks = Vec::new();

    if let Some(choice) = v.get("choices").and_then(|c| c.as_array()).and_then(|c| c.first()) {
        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    chunks.push(Ok(Chunk::Text {
                        text: text.to_string(),
                    }));
                }
            }
            if let Some(text) = delta.get("reasoning_content").and_then(Value::as_str) {
                if !text.is_empty() {
                    chunks.push(Ok(Chunk::Reasoning {
                        text: text.to_string(),
                    }));
                }
            }
        }
        if choice.get("finish_reason").is_some_and(|r| !r.is_null()) {
            chunks.push(Ok(Chunk::ContentBlockStop));
        }
    }

    // The final usage frame has an empty `choices` array.
    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        chunks.push(Ok(Chunk::Usage(TokenUsage {
            input_tokens: usage
                .get("prompt_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            output_tokens: usage
                .get("completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            cache_write_tokens: None,
            cache_read_tokens: usage
                .get("prompt_tokens_details")
                .and_then(|d| d.get("cached_tokens"))
                .and_then(Value::as_u64),
        })));
    }

    chunks
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl StreamingClient for OpenAiCompatClient {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn stream(&self, session: &Session) -> Result<BoxStream<'static, Result<Chunk>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(session);

        tracing::debug!(provider = %self.id, url = %url, model = %self.model, "openai-compat stream request");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let resp = request.json(&body).send().await.map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: Some(status.as_u16()),
                message: err_text,
            });
        }

        Ok(sse_response_stream(resp, parse_openai_sse))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
