//! Scripted LLM provider.
//!
//! Returns a fixed sequence of completions. Used by the offline demo and by
//! the end-to-end tests, where the number of real completion executions must
//! be observable across interruption and resume.

use super::provider::{CompletionOptions, LlmError, LlmProvider};
use super::types::{CompletionResponse, Message};
use crate::agent::tools::ToolDefinition;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// An LLM provider that plays back a pre-written script of responses.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<CompletionResponse>>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    /// Create a provider that will return the given responses in order.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of completions actually served (replays from the durable layer
    /// do not reach the provider and are not counted).
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _messages: &[Message],
        _tools: Option<&[ToolDefinition]>,
        _options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .expect("script mutex poisoned")
            .pop_front();
        next.ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::types::FinishReason;

    #[tokio::test]
    async fn test_scripted_provider_plays_back_in_order() {
        let provider = ScriptedProvider::new(vec![
            CompletionResponse {
                message: Message::assistant("first"),
                finish_reason: FinishReason::Stop,
                usage: None,
            },
            CompletionResponse {
                message: Message::assistant("second"),
                finish_reason: FinishReason::Stop,
                usage: None,
            },
        ]);

        let opts = CompletionOptions::default();
        let first = provider.complete(&[], None, &opts).await.unwrap();
        assert_eq!(first.message.content, "first");
        let second = provider.complete(&[], None, &opts).await.unwrap();
        assert_eq!(second.message.content, "second");
        assert_eq!(provider.calls(), 2);

        let exhausted = provider.complete(&[], None, &opts).await;
        assert!(matches!(exhausted, Err(LlmError::InvalidResponse(_))));
    }
}
