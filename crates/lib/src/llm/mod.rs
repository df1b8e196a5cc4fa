//! LLM abstraction and OpenAI-compatible client.
//!
//! Agents talk to the model through [`LlmBackend`] so routing and tool dispatch can be
//! exercised without a live provider.

mod openai;

use async_trait::async_trait;
use std::time::Duration;

pub use openai::{
    ChatMessage, ChatResponse, OpenAiClient, ToolCall, ToolCallFunction, ToolDefinition,
    ToolFunctionDefinition,
};

/// Attempts made by [`embed_with_backoff`] before giving up.
pub const EMBED_MAX_ATTEMPTS: u32 = 3;

/// Delay before the second embedding attempt; doubled for each later attempt.
pub const EMBED_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm api error: {0}")]
    Api(String),
    #[error("llm response invalid: {0}")]
    Decode(String),
}

/// Chat completion and embeddings against one provider/model pair.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Non-streaming chat completion. When `tools` is Some, the model may answer with tool calls.
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, LlmError>;

    /// One embedding vector per input, in input order.
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, LlmError>;
}

/// Embed with a capped doubling backoff: up to [`EMBED_MAX_ATTEMPTS`] tries, sleeping
/// `base_delay * 2^attempt` between them. Returns the last error when every attempt fails.
pub async fn embed_with_backoff(
    backend: &dyn LlmBackend,
    inputs: Vec<String>,
    base_delay: Duration,
) -> Result<Vec<Vec<f32>>, LlmError> {
    let mut attempt = 0;
    loop {
        match backend.embed(inputs.clone()).await {
            Ok(vectors) => return Ok(vectors),
            Err(e) if attempt + 1 >= EMBED_MAX_ATTEMPTS => return Err(e),
            Err(e) => {
                let wait = base_delay * 2u32.pow(attempt);
                log::warn!(
                    "llm: embedding attempt {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    e,
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyEmbedder {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmBackend for FlakyEmbedder {
        async fn chat(
            &self,
            _messages: Vec<ChatMessage>,
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<ChatResponse, LlmError> {
            Err(LlmError::Api("chat not used".to_string()))
        }

        async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(LlmError::Api("429 rate limited".to_string()))
            } else {
                Ok(inputs.iter().map(|_| vec![0.5, 0.5]).collect())
            }
        }
    }

    #[tokio::test]
    async fn backoff_recovers_after_transient_failures() {
        let backend = FlakyEmbedder {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let out = embed_with_backoff(&backend, vec!["e4".to_string()], Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn backoff_gives_up_after_three_attempts() {
        let backend = FlakyEmbedder {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let err = embed_with_backoff(&backend, vec!["d4".to_string()], Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), EMBED_MAX_ATTEMPTS);
    }
}
