//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API streaming protocol: system prompt
//! in a separate top-level `system` field, SSE events decoded into the
//! uniform chunk taxonomy (text and thinking deltas, usage with cache
//! counters, block/message stops).

use serde_json::Value;

use sw_domain::config::ProviderConfig;
use sw_domain::error::{Error, Result};
use sw_domain::session::{Role, Session};
use sw_domain::stream::{BoxStream, Chunk, TokenUsage};

use crate::sse::sse_response_stream;
use crate::traits::StreamingClient;
use crate::util::{from_reqwest, resolve_api_key};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A streaming client for the Anthropic Messages API.
pub struct AnthropicClient {
    id: String,
    base_url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Create a new client from the deserialized provider config.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
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
        let messages: Vec<Value> = session
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_output_tokens,
            "stream": true,
        });
        if !session.system_prompt.is_empty() {
            body["system"] = Value::String(session.system_prompt.clone());
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_usage(v: &Value) -> TokenUsage {
    TokenUsage {
        input_tokens: v.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
        output_tokens: v.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        cache_write_tokens: v
            .get("cache_creation_input_tokens")
            .and_then(Value::as_u64),
        cache_read_tokens: v.get("cache_read_input_tokens").and_then(Value::as_u64),
    }
}

/// Decode one Anthropic SSE data payload into zero or more chunks.
fn parse_anthropic_sse(data: &str, provider_id: &str) -> Vec<Result<Chunk>> {
    let mut chunks = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            chunks.push(Err(Error::Json(e)));
            return chunks;
        }
    };

    let event_type = v.get("type").and_then(Value::as_str).unwrap_or("");

    match event_type {
        "message_start" => {
            if let Some(usage) = v.get("message").and_then(|m| m.get("usage")) {
                chunks.push(Ok(Chunk::Usage(parse_usage(usage))));
            }
        }

        "content_block_delta" => {
            if let Some(delta) = v.get("delta") {
                let delta_type = delta.get("type").and_then(Value::as_str).unwrap_or("");
                match delta_type {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                chunks.push(Ok(Chunk::Text {
                                    text: text.to_string(),
                                }));
                            }
                        }
                    }
                    "thinking_delta" => {
                        if let Some(text) = delta.get("thinking").and_then(Value::as_str) {
                            if !text.is_empty() {
                                chunks.push(Ok(Chunk::Reasoning {
                                    text: text.to_string(),
                                }));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        "content_block_stop" => {
            chunks.push(Ok(Chunk::ContentBlockStop));
        }

        "message_delta" => {
            // Carries the final output-token count.
            if let Some(usage) = v.get("usage") {
                chunks.push(Ok(Chunk::Usage(parse_usage(usage))));
            }
        }

        "message_stop" => {
            chunks.push(Ok(Chunk::MessageStop));
        }

        "error" => {
            let error_type = v
                .get("error")
                .and_then(|e| e.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let message = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            chunks.push(Err(Error::Provider {
                provider: provider_id.to_owned(),
                message: format!("{error_type}: {message}"),
                retryable: error_type == "overloaded_error",
            }));
        }

        _ => {
            // ping, content_block_start, unknown event types -- ignore.
        }
    }

    chunks
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl StreamingClient for AnthropicClient {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn stream(&self, session: &Session) -> Result<BoxStream<'static, Result<Chunk>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(session);

        tracing::debug!(provider = %self.id, url = %url, model = %self.model, "anthropic stream request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: Some(status.as_u16()),
                message: err_text,
            });
        }

        let provider_id = self.id.clone();
        Ok(sse_response_stream(resp, move |data| {
            parse_anthropic_sse(data, &provider_id)
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
