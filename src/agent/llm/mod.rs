//! LLM provider abstraction layer.
//!
//! This module provides a trait-based abstraction for LLM providers. The
//! conversation loop works against [`LlmProvider`], so the same loop runs
//! against a real OpenAI-compatible endpoint or a scripted stand-in.

mod openai;
mod provider;
mod scripted;
mod types;

pub use openai::OpenAiProvider;
pub use provider::{CompletionOptions, LlmError, LlmProvider};
pub use scripted::ScriptedProvider;
pub use types::{CompletionResponse, FinishReason, Message, MessageRole, TokenUsage, ToolCall};
