//! Agent personas and the conversation loop.
//!
//! The loop alternates between requesting a completion from the LLM and
//! executing the tool calls it asked for, until the model stops requesting
//! tools or the turn limit is reached. The two sub-operations are exposed as
//! public methods so the durable adapter can drive the same loop with each
//! sub-operation checkpointed as a step.

use crate::agent::llm::{
    CompletionOptions, CompletionResponse, LlmError, LlmProvider, Message, ToolCall,
};
use crate::agent::tools::{ToolContext, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while running a conversation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Maximum turns exceeded ({0})")]
    MaxTurnsExceeded(u32),
}

/// An agent persona: a name, its instructions, and the tools it may use.
pub struct Agent {
    name: String,
    instructions: String,
    tools: Arc<ToolRegistry>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tools,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// The system message carrying this agent's instructions.
    pub fn system_message(&self) -> Message {
        Message::system(self.instructions.clone())
    }
}

/// Final state of a finished conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationOutcome {
    /// The full conversation, system message included.
    pub messages: Vec<Message>,
    /// Content of the final assistant message.
    pub final_content: String,
    /// Number of completion turns used.
    pub turns: u32,
}

/// Drives conversations between an agent and an LLM provider.
pub struct AgentRunner {
    provider: Arc<dyn LlmProvider>,
    options: CompletionOptions,
    max_turns: u32,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn LlmProvider>, max_turns: u32) -> Self {
        Self {
            provider,
            options: CompletionOptions::default(),
            max_turns,
        }
    }

    /// Set completion options.
    pub fn with_completion_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Request one completion for the current conversation state.
    pub async fn request_completion(
        &self,
        agent: &Agent,
        messages: &[Message],
    ) -> Result<CompletionResponse, LlmError> {
        let tool_defs = agent.tools().definitions();
        let tools = if tool_defs.is_empty() {
            None
        } else {
            Some(tool_defs.as_slice())
        };
        self.provider.complete(messages, tools, &self.options).await
    }

    /// Execute a single tool call and return the tool response message.
    ///
    /// Tool failures are folded into the response content so the model can
    /// see the error and decide how to proceed.
    pub async fn execute_tool_call(
        &self,
        agent: &Agent,
        call: &ToolCall,
        ctx: &ToolContext,
    ) -> Message {
        debug!(tool = %call.name, "Executing tool call");
        let result = agent
            .tools()
            .execute(&call.name, call.arguments.clone(), ctx)
            .await;

        let content = match result {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_default(),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                format!("Error: {}", e)
            }
        };

        Message::tool_response(&call.id, &call.name, content)
    }

    /// Run the conversation loop until the model stops requesting tools.
    ///
    /// The system message for `agent` is prepended if `messages` does not
    /// already start with one.
    pub async fn run(
        &self,
        agent: &Agent,
        messages: Vec<Message>,
        ctx: &ToolContext,
    ) -> Result<ConversationOutcome, AgentError> {
        let mut messages = with_system_message(agent, messages);
        let mut turns = 0;

        loop {
            turns += 1;
            if turns > self.max_turns {
                return Err(AgentError::MaxTurnsExceeded(self.max_turns));
            }

            let response = self.request_completion(agent, &messages).await?;
            debug!(
                agent = %agent.name(),
                turn = turns,
                content = %truncate(&response.message.content, 200),
                "Completion received"
            );
            messages.push(response.message.clone());

            let tool_calls = match &response.message.tool_calls {
                Some(calls) if !calls.is_empty() => calls.clone(),
                _ => {
                    return Ok(ConversationOutcome {
                        final_content: response.message.content,
                        messages,
                        turns,
                    });
                }
            };

            for call in &tool_calls {
                let tool_message = self.execute_tool_call(agent, call, ctx).await;
                messages.push(tool_message);
            }
        }
    }
}

/// Prepend the agent's system message unless one is already present.
pub fn with_system_message(agent: &Agent, messages: Vec<Message>) -> Vec<Message> {
    match messages.first() {
        Some(first) if first.role == crate::agent::llm::MessageRole::System => messages,
        _ => {
            let mut out = Vec::with_capacity(messages.len() + 1);
            out.push(agent.system_message());
            out.extend(messages);
            out
        }
    }
}

/// Truncate a string to a maximum length.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::{FinishReason, MessageRole, ScriptedProvider};
    use crate::agent::tools::{AgentTool, ToolDefinition, ToolError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingTool(Arc<AtomicU32>);

    #[async_trait]
    impl AgentTool for CountingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::no_params("count", "Counts invocations")
        }

        async fn execute(
            &self,
            _args: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(serde_json::json!({"count": n}))
        }
    }

    fn tool_call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({}),
        }
    }

    fn completion(message: Message, finish_reason: FinishReason) -> CompletionResponse {
        CompletionResponse {
            message,
            finish_reason,
            usage: None,
        }
    }

    #[tokio::test]
    async fn test_run_executes_tools_until_final_message() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut tools = ToolRegistry::new();
        tools.register(CountingTool(counter.clone()));
        let agent = Agent::new("counter", "You count.", Arc::new(tools));

        let provider = Arc::new(ScriptedProvider::new(vec![
            completion(
                Message::assistant_with_tools("", vec![tool_call("c1", "count")]),
                FinishReason::ToolCalls,
            ),
            completion(Message::assistant("counted once"), FinishReason::Stop),
        ]));

        let runner = AgentRunner::new(provider.clone(), 10);
        let outcome = runner
            .run(&agent, vec![Message::user("count for me")], &ToolContext::new())
            .await
            .unwrap();

        assert_eq!(outcome.final_content, "counted once");
        assert_eq!(outcome.turns, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(provider.calls(), 2);
        // system + user + assistant(tool_calls) + tool + assistant(final)
        assert_eq!(outcome.messages.len(), 5);
        assert_eq!(outcome.messages[0].role, MessageRole::System);
    }

    #[tokio::test]
    async fn test_run_stops_at_turn_limit() {
        let mut tools = ToolRegistry::new();
        tools.register(CountingTool(Arc::new(AtomicU32::new(0))));
        let agent = Agent::new("looper", "You loop.", Arc::new(tools));

        // The script keeps requesting tools, never finishing.
        let provider = Arc::new(ScriptedProvider::new(
            (0..5)
                .map(|i| {
                    completion(
                        Message::assistant_with_tools(
                            "",
                            vec![tool_call(&format!("c{}", i), "count")],
                        ),
                        FinishReason::ToolCalls,
                    )
                })
                .collect(),
        ));

        let runner = AgentRunner::new(provider, 3);
        let result = runner
            .run(&agent, vec![Message::user("go")], &ToolContext::new())
            .await;
        assert!(matches!(result, Err(AgentError::MaxTurnsExceeded(3))));
    }

    #[tokio::test]
    async fn test_tool_error_is_reported_to_the_model() {
        let tools = Arc::new(ToolRegistry::new());
        let agent = Agent::new("empty", "No tools.", tools);
        let runner = AgentRunner::new(
            Arc::new(ScriptedProvider::new(vec![])),
            10,
        );

        let message = runner
            .execute_tool_call(&agent, &tool_call("c1", "missing"), &ToolContext::new())
            .await;
        assert_eq!(message.role, MessageRole::Tool);
        assert!(message.content.starts_with("Error:"));
    }

    #[test]
    fn test_with_system_message_does_not_duplicate() {
        let agent = Agent::new("a", "instructions", Arc::new(ToolRegistry::new()));
        let already = vec![Message::system("custom"), Message::user("hi")];
        let kept = with_system_message(&agent, already.clone());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].content, "custom");

        let prepended = with_system_message(&agent, vec![Message::user("hi")]);
        assert_eq!(prepended.len(), 2);
        assert_eq!(prepended[0].content, "instructions");
    }
}
