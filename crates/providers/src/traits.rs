use sw_domain::error::Result;
use sw_domain::session::Session;
use sw_domain::stream::{BoxStream, Chunk, TokenUsage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every remote LLM adapter must implement.
///
/// Implementations are provider-specific adapters (Anthropic,
/// OpenAI-compatible) that translate between the session's conversation
/// and each provider's wire format, decoding the native event stream into
/// the uniform [`Chunk`] taxonomy.
#[async_trait::async_trait]
pub trait StreamingClient: Send + Sync {
    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;

    /// Start streaming a completion for the session's conversation.
    ///
    /// The stream is not resumable — the retry layer restarts the whole
    /// request from scratch on transient failure.
    async fn stream(&self, session: &Session) -> Result<BoxStream<'static, Result<Chunk>>>;

    /// Release held resources. Most adapters have nothing to do.
    async fn shutdown(&self) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response folding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A chunk stream folded into a complete response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    /// Concatenated `text` chunks — the response body.
    pub text: String,
    /// Concatenated `reasoning` chunks.
    pub reasoning: String,
    /// Accumulated usage counters.
    pub usage: TokenUsage,
}

/// Fold a chunk sequence: usage chunks accumulate, text/reasoning chunks
/// concatenate, `message_stop` ends the fold.
pub async fn fold_chunks(
    mut stream: BoxStream<'static, Result<Chunk>>,
) -> Result<ProviderResponse> {
    use futures_util::StreamExt;

    let mut response = ProviderResponse::default();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            Chunk::Text { text } => response.text.push_str(&text),
            Chunk::Reasoning { text } => response.reasoning.push_str(&text),
            Chunk::Usage(usage) => response.usage.accumulate(&usage),
            Chunk::ContentBlockStop => {}
            Chunk::MessageStop => break,
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_domain::error::Error;

    fn stream_of(chunks: Vec<Result<Chunk>>) -> BoxStream<'static, Result<Chunk>> {
        Box::pin(futures_util::stream::iter(chunks))
    }

    #[tokio::test]
    async fn fold_concatenates_and_accumulates() {
        let response = fold_chunks(stream_of(vec![
            Ok(Chunk::Usage(TokenUsage {
                input_tokens: 10,
                ..Default::default()
            })),
            Ok(Chunk::Reasoning {
                text: "thinking ".into(),
            }),
            Ok(Chunk::Text { text: "Hello".into() }),
            Ok(Chunk::Text { text: ", world".into() }),
            Ok(Chunk::ContentBlockStop),
            Ok(Chunk::Usage(TokenUsage {
                output_tokens: 4,
                ..Default::default()
            })),
            Ok(Chunk::MessageStop),
        ]))
        .await
        .unwrap();

        assert_eq!(response.text, "Hello, world");
        assert_eq!(response.reasoning, "thinking ");
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 4);
    }

    #[tokio::test]
    async fn fold_stops_reading_after_message_stop() {
        let response = fold_chunks(stream_of(vec![
            Ok(Chunk::Text { text: "a".into() }),
            Ok(Chunk::MessageStop),
            Ok(Chunk::Text { text: "b".into() }),
        ]))
        .await
        .unwrap();
        assert_eq!(response.text, "a");
    }

    #[tokio::test]
    async fn fold_propagates_stream_errors() {
        let err = fold_chunks(stream_of(vec![
            Ok(Chunk::Text { text: "a".into() }),
            Err(Error::Http {
                status: Some(500),
                message: "boom".into(),
            }),
        ]))
        .await
        .unwrap_err();
        assert!(err.is_transient());
    }
}
