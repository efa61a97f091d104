//! Durable conversation adapter.
//!
//! [`DurableAgentRunner`] composes the conversation loop with the durable
//! runtime: the loop runs as a registered workflow, each completion request
//! is checkpointed as a `chat_completion` step, and each tool call is
//! checkpointed as a `tool:<name>` step. Tools that report
//! [`CheckpointMode::SelfManaged`] are invoked directly and record their own
//! finer-grained steps through the [`StepContext`] placed in the
//! [`ToolContext`] under [`DURABLE_STEPS_KEY`] — so steps never nest.
//!
//! If the process dies mid-conversation, re-invoking under the same
//! invocation identity replays the recorded completions and tool outputs
//! and picks up at the first unrecorded step.

use crate::agent::llm::CompletionResponse;
use crate::agent::tools::CheckpointMode;
use crate::agent::{with_system_message, Agent, AgentRunner, ConversationOutcome, Message, ToolContext};
use crate::durable::{DurableError, DurableRuntime, StepContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Workflow name the adapter registers the conversation loop under.
pub const AGENT_CONVERSATION_WORKFLOW: &str = "agent_conversation";

/// `ToolContext` key under which self-managed tools find the step handle.
pub const DURABLE_STEPS_KEY: &str = "durable_steps";

/// Input payload of an `agent_conversation` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationInput {
    pub messages: Vec<Message>,
}

/// Runs agent conversations as durable workflow invocations.
pub struct DurableAgentRunner {
    runtime: Arc<DurableRuntime>,
    runner: Arc<AgentRunner>,
    agent: Arc<Agent>,
    base_ctx: ToolContext,
}

impl DurableAgentRunner {
    /// Create the adapter and register its workflow with the runtime.
    ///
    /// `base_ctx` carries the shared collaborators tools need; the adapter
    /// adds the per-invocation step handle on every run.
    pub fn new(
        runtime: Arc<DurableRuntime>,
        runner: Arc<AgentRunner>,
        agent: Arc<Agent>,
        base_ctx: ToolContext,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            runtime: runtime.clone(),
            runner,
            agent,
            base_ctx,
        });

        let registered = this.clone();
        runtime.register(AGENT_CONVERSATION_WORKFLOW, move |steps, input| {
            let this = registered.clone();
            async move { this.drive(steps, input).await }
        });

        this
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Run (or resume, or replay) a conversation under `invocation_id`.
    pub async fn run(
        &self,
        invocation_id: &str,
        messages: Vec<Message>,
    ) -> Result<ConversationOutcome, DurableError> {
        let input = serde_json::to_value(ConversationInput { messages })?;
        let output = self
            .runtime
            .invoke(invocation_id, AGENT_CONVERSATION_WORKFLOW, input)
            .await?;
        Ok(serde_json::from_value(output)?)
    }

    /// The workflow body: the conversation loop with checkpointed
    /// sub-operations.
    async fn drive(
        &self,
        steps: StepContext,
        input: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let input: ConversationInput = serde_json::from_value(input)?;

        let mut ctx = self.base_ctx.clone();
        ctx.insert(DURABLE_STEPS_KEY, steps.clone());

        let mut messages = with_system_message(&self.agent, input.messages);
        let mut turns = 0;

        loop {
            turns += 1;
            if turns > self.runner.max_turns() {
                anyhow::bail!("maximum turns exceeded ({})", self.runner.max_turns());
            }

            let response: CompletionResponse = {
                let runner = self.runner.clone();
                let agent = self.agent.clone();
                let snapshot = messages.clone();
                steps
                    .step("chat_completion", move || {
                        let runner = runner.clone();
                        let agent = agent.clone();
                        let snapshot = snapshot.clone();
                        async move {
                            runner
                                .request_completion(&agent, &snapshot)
                                .await
                                .map_err(anyhow::Error::from)
                        }
                    })
                    .await?
            };
            messages.push(response.message.clone());

            let tool_calls = match &response.message.tool_calls {
                Some(calls) if !calls.is_empty() => calls.clone(),
                _ => {
                    debug!(
                        invocation = %steps.invocation_id(),
                        turns,
                        "Conversation finished"
                    );
                    let outcome = ConversationOutcome {
                        final_content: response.message.content,
                        messages,
                        turns,
                    };
                    return Ok(serde_json::to_value(outcome)?);
                }
            };

            for call in &tool_calls {
                let mode = self
                    .agent
                    .tools()
                    .get(&call.name)
                    .map(|t| t.checkpoint_mode())
                    .unwrap_or(CheckpointMode::Wrapped);

                let tool_message: Message = match mode {
                    CheckpointMode::Wrapped => {
                        let runner = self.runner.clone();
                        let agent = self.agent.clone();
                        let call_cl = call.clone();
                        let ctx_cl = ctx.clone();
                        steps
                            .step(&format!("tool:{}", call.name), move || {
                                let runner = runner.clone();
                                let agent = agent.clone();
                                let call = call_cl.clone();
                                let ctx = ctx_cl.clone();
                                async move { Ok(runner.execute_tool_call(&agent, &call, &ctx).await) }
                            })
                            .await?
                    }
                    CheckpointMode::SelfManaged => {
                        self.runner.execute_tool_call(&self.agent, call, &ctx).await
                    }
                };
                messages.push(tool_message);
            }
        }
    }
}
