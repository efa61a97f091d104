//! Ostinato — durable agent conversations.
//!
//! An agent conversation loop (completion requests alternating with tool
//! calls) run as a durable workflow: every sub-operation is checkpointed in
//! SQLite, so a conversation interrupted mid-flight resumes from its last
//! recorded step when re-invoked under the same identity. Ships with a mock
//! refund-processing demo that makes interruption and resumption observable.

pub mod adapter;
pub mod agent;
pub mod config;
pub mod durable;
pub mod refund;

// Re-export commonly used types for convenience
pub use adapter::{ConversationInput, DurableAgentRunner, AGENT_CONVERSATION_WORKFLOW};
pub use agent::{Agent, AgentRunner, ConversationOutcome, Message};
pub use durable::{DurableRuntime, RetryPolicy, SqliteWorkflowStore, StepContext, WorkflowStore};
