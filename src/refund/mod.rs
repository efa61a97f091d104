//! Mock refund processing demo.
//!
//! A refund-agent persona with two tools: `process_refund`, a long-running
//! operation decomposed into numbered stages separated by a delay, and
//! `apply_discount`. Each refund stage is checkpointed as its own step, so
//! interrupting the process after stage 3 and re-invoking under the same
//! identity resumes at stage 4 rather than starting over.
//!
//! Side effects are recorded on a shared [`RefundLedger`], which is how the
//! demo (and the tests) observe exactly which stages executed on which run.

use crate::adapter::DURABLE_STEPS_KEY;
use crate::agent::llm::{CompletionResponse, FinishReason, Message, ToolCall};
use crate::agent::tools::{
    AgentTool, CheckpointMode, ToolContext, ToolDefinition, ToolError, ToolRegistry,
};
use crate::agent::Agent;
use crate::durable::StepContext;
use async_trait::async_trait;
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Number of stages the mock refund runs through.
pub const REFUND_STAGES: u32 = 5;

/// Discount percentage granted after a refund.
pub const DISCOUNT_PERCENT: u32 = 10;

#[cfg(not(feature = "fast-demo"))]
pub const DEFAULT_STAGE_DELAY_MS: u64 = 1000;
#[cfg(feature = "fast-demo")]
pub const DEFAULT_STAGE_DELAY_MS: u64 = 50;

/// One executed refund stage (not a replayed one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageExecution {
    pub invocation_id: String,
    pub stage: u32,
}

/// A refund that ran through all stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRefund {
    pub invocation_id: String,
    pub item_id: String,
}

/// Observable side effects of the mock refund business operation.
///
/// Replayed steps do not touch the ledger, so across an interruption the
/// ledger shows exactly which stages really executed.
#[derive(Default)]
pub struct RefundLedger {
    inner: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    stage_executions: Vec<StageExecution>,
    completed_refunds: Vec<CompletedRefund>,
    discounts_applied: u32,
}

impl RefundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.inner.lock().expect("refund ledger mutex poisoned")
    }

    pub fn record_stage(&self, invocation_id: &str, stage: u32) {
        self.lock().stage_executions.push(StageExecution {
            invocation_id: invocation_id.to_string(),
            stage,
        });
    }

    pub fn record_refund(&self, invocation_id: &str, item_id: &str) {
        self.lock().completed_refunds.push(CompletedRefund {
            invocation_id: invocation_id.to_string(),
            item_id: item_id.to_string(),
        });
    }

    pub fn record_discount(&self) {
        self.lock().discounts_applied += 1;
    }

    /// All stage executions, in order.
    pub fn stage_executions(&self) -> Vec<StageExecution> {
        self.lock().stage_executions.clone()
    }

    /// Stages executed for one invocation, in order.
    pub fn stages_for(&self, invocation_id: &str) -> Vec<u32> {
        self.lock()
            .stage_executions
            .iter()
            .filter(|e| e.invocation_id == invocation_id)
            .map(|e| e.stage)
            .collect()
    }

    pub fn completed_refunds(&self) -> Vec<CompletedRefund> {
        self.lock().completed_refunds.clone()
    }

    pub fn discounts_applied(&self) -> u32 {
        self.lock().discounts_applied
    }
}

/// The mock multi-stage refund operation.
///
/// Self-managed: each stage (and the final completion) is recorded as its
/// own step, so a resumed invocation re-runs only the unrecorded stages.
/// Outside a durable invocation the stages simply run back to back.
pub struct ProcessRefundTool {
    ledger: Arc<RefundLedger>,
    stage_delay: Duration,
}

impl ProcessRefundTool {
    pub fn new(ledger: Arc<RefundLedger>, stage_delay: Duration) -> Self {
        Self {
            ledger,
            stage_delay,
        }
    }

    async fn run_stage(&self, invocation_id: &str, stage: u32) -> u32 {
        info!(stage, total = REFUND_STAGES, "Processing refund stage");
        self.ledger.record_stage(invocation_id, stage);
        tokio::time::sleep(self.stage_delay).await;
        stage
    }
}

#[async_trait]
impl AgentTool for ProcessRefundTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "process_refund",
            "Process a refund for an item. Takes a while to complete.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "item_id": {
                        "type": "string",
                        "description": "Identifier of the item to refund"
                    }
                },
                "required": ["item_id"]
            }),
        )
    }

    fn checkpoint_mode(&self) -> CheckpointMode {
        CheckpointMode::SelfManaged
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let item_id = args
            .get("item_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing item_id".to_string()))?
            .to_string();

        let steps: Option<Arc<StepContext>> = ctx.get(DURABLE_STEPS_KEY);
        let invocation_id = steps
            .as_ref()
            .map(|s| s.invocation_id().to_string())
            .unwrap_or_else(|| "unmanaged".to_string());

        info!(item_id = %item_id, "Refund requested");

        for stage in 1..=REFUND_STAGES {
            match &steps {
                Some(handle) => {
                    handle
                        .step("refund_stage", || self.run_stage(&invocation_id, stage).map(Ok))
                        .await
                        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                }
                None => {
                    self.run_stage(&invocation_id, stage).await;
                }
            }
        }

        let summary = serde_json::json!({
            "item_id": item_id,
            "status": "refunded",
            "stages_completed": REFUND_STAGES,
        });

        match &steps {
            Some(handle) => {
                let ledger = self.ledger.clone();
                let result = handle
                    .step("refund_complete", move || {
                        let ledger = ledger.clone();
                        let invocation_id = invocation_id.clone();
                        let item_id = item_id.clone();
                        let summary = summary.clone();
                        async move {
                            ledger.record_refund(&invocation_id, &item_id);
                            info!(item_id = %item_id, "Refund processed");
                            Ok(summary)
                        }
                    })
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                Ok(result)
            }
            None => {
                self.ledger.record_refund(&invocation_id, &item_id);
                info!(item_id = %item_id, "Refund processed");
                Ok(summary)
            }
        }
    }
}

/// Grants the post-refund discount.
///
/// Wrapped: the durable loop records the whole call as one step, so a
/// replayed invocation does not grant the discount twice.
pub struct ApplyDiscountTool {
    ledger: Arc<RefundLedger>,
}

impl ApplyDiscountTool {
    pub fn new(ledger: Arc<RefundLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl AgentTool for ApplyDiscountTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::no_params(
            "apply_discount",
            "Apply a discount to the customer's next purchase.",
        )
    }

    async fn execute(
        &self,
        _args: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        self.ledger.record_discount();
        info!(percent = DISCOUNT_PERCENT, "Discount applied");
        Ok(serde_json::json!({ "discount_percent": DISCOUNT_PERCENT }))
    }
}

/// Build the refund-agent persona with its tools.
pub fn refund_agent(ledger: Arc<RefundLedger>, stage_delay: Duration) -> Agent {
    let mut tools = ToolRegistry::new();
    tools.register(ProcessRefundTool::new(ledger.clone(), stage_delay));
    tools.register(ApplyDiscountTool::new(ledger));

    Agent::new(
        "refund-agent",
        "You are a customer support agent handling refunds. \
         Use process_refund to refund the item the customer names, then \
         always use apply_discount, and finish with a short summary that \
         states the refund outcome and the discount percentage.",
        Arc::new(tools),
    )
}

/// Opening message for the demo conversation.
pub fn opening_messages(user: &str, item_id: &str) -> Vec<Message> {
    vec![Message::user(format!(
        "Hi, my name is {}. I want to return item {} and get a refund.",
        user, item_id
    ))]
}

/// Offline stand-in for the language model in the refund demo.
///
/// Decides its next response from the conversation so far: refund first,
/// then discount, then a closing summary. Because the decision depends only
/// on the (replayed) messages, a resumed invocation gets the same responses
/// it would have gotten in one uninterrupted run — a position-counting
/// script would drift after replay.
pub struct DemoRefundProvider {
    item_id: String,
    calls: std::sync::atomic::AtomicU32,
}

impl DemoRefundProvider {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Number of completions actually served (replays are not counted).
    pub fn calls(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn has_tool_response(messages: &[Message], tool_name: &str) -> bool {
        messages.iter().any(|m| {
            m.role == crate::agent::llm::MessageRole::Tool
                && m.tool_name.as_deref() == Some(tool_name)
        })
    }
}

#[async_trait]
impl crate::agent::llm::LlmProvider for DemoRefundProvider {
    fn name(&self) -> &str {
        "demo-refund"
    }

    fn model(&self) -> &str {
        "demo-refund"
    }

    async fn complete(
        &self,
        messages: &[Message],
        _tools: Option<&[ToolDefinition]>,
        _options: &crate::agent::llm::CompletionOptions,
    ) -> Result<CompletionResponse, crate::agent::llm::LlmError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let response = if !Self::has_tool_response(messages, "process_refund") {
            CompletionResponse {
                message: Message::assistant_with_tools(
                    "",
                    vec![ToolCall {
                        id: "call_refund".to_string(),
                        name: "process_refund".to_string(),
                        arguments: serde_json::json!({ "item_id": self.item_id }),
                    }],
                ),
                finish_reason: FinishReason::ToolCalls,
                usage: None,
            }
        } else if !Self::has_tool_response(messages, "apply_discount") {
            CompletionResponse {
                message: Message::assistant_with_tools(
                    "",
                    vec![ToolCall {
                        id: "call_discount".to_string(),
                        name: "apply_discount".to_string(),
                        arguments: serde_json::json!({}),
                    }],
                ),
                finish_reason: FinishReason::ToolCalls,
                usage: None,
            }
        } else {
            CompletionResponse {
                message: Message::assistant(format!(
                    "Your refund for {} has been processed. As an apology for the \
                     inconvenience, a {}% discount has been applied to your next \
                     purchase.",
                    self.item_id, DISCOUNT_PERCENT
                )),
                finish_reason: FinishReason::Stop,
                usage: None,
            }
        };

        Ok(response)
    }
}
