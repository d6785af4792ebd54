use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// One unit of a provider's streamed response (provider-agnostic).
///
/// Every adapter decodes its native event stream into this taxonomy; the
/// orchestrator and CLI only ever see chunks.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum Chunk {
    /// A piece of the response body.
    #[serde(rename = "text")]
    Text { text: String },

    /// A piece of the model's reasoning/thinking output.
    #[serde(rename = "reasoning")]
    Reasoning { text: String },

    /// Token accounting. May arrive more than once per response; counters
    /// accumulate.
    #[serde(rename = "usage")]
    Usage(TokenUsage),

    /// One content block finished.
    #[serde(rename = "content_block_stop")]
    ContentBlockStop,

    /// The whole message finished.
    #[serde(rename = "message_stop")]
    MessageStop,
}

/// Token usage counters for a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
}

impl TokenUsage {
    /// Fold another usage report into this one.
    ///
    /// Plain counters add; cache counters stay `None` until a report
    /// actually carries one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        if let Some(w) = other.cache_write_tokens {
            *self.cache_write_tokens.get_or_insert(0) += w;
        }
        if let Some(r) = other.cache_read_tokens {
            *self.cache_read_tokens.get_or_insert(0) += r;
        }
    }
}
