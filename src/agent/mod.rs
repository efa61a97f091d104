//! Agent infrastructure for LLM-powered conversations.
//!
//! This module provides a small agent framework:
//! - LLM provider abstraction (OpenAI-compatible, plus a scripted provider)
//! - Tool registry for agent capabilities
//! - Agent personas and the completion/tool-call conversation loop
//!
//! The loop's sub-operations are exposed individually so the durable adapter
//! in [`crate::adapter`] can checkpoint each of them as a step.

pub mod llm;
mod runner;
pub mod tools;

pub use llm::{
    CompletionOptions, CompletionResponse, FinishReason, LlmError, LlmProvider, Message,
    MessageRole, OpenAiProvider, ScriptedProvider, ToolCall,
};
pub use runner::{with_system_message, Agent, AgentError, AgentRunner, ConversationOutcome};
pub use tools::{AgentTool, CheckpointMode, ToolContext, ToolDefinition, ToolError, ToolRegistry};
