//! Shared fixtures for end-to-end tests.

use ostinato::adapter::DurableAgentRunner;
use ostinato::agent::{AgentRunner, LlmProvider, ToolContext};
use ostinato::durable::{DurableRuntime, RetryPolicy, SqliteWorkflowStore, WorkflowStore};
use ostinato::refund::{refund_agent, DemoRefundProvider, RefundLedger};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const TEST_USER: &str = "Max";
pub const TEST_ITEM: &str = "item_99";

/// Everything one "process" of the refund demo owns.
///
/// Tests model a restart by building a second `DemoProcess` over the same
/// database file: the ledger and provider are fresh (in-memory state dies
/// with the process), only the workflow database survives.
pub struct DemoProcess {
    pub store: Arc<SqliteWorkflowStore>,
    pub runtime: Arc<DurableRuntime>,
    pub ledger: Arc<RefundLedger>,
    pub provider: Arc<DemoRefundProvider>,
    pub adapter: Arc<DurableAgentRunner>,
}

pub fn demo_process(db_path: &Path, stage_delay: Duration) -> DemoProcess {
    let store = Arc::new(SqliteWorkflowStore::open(db_path).unwrap());
    let runtime = Arc::new(DurableRuntime::new(
        store.clone() as Arc<dyn WorkflowStore>,
        RetryPolicy::default(),
    ));

    let ledger = Arc::new(RefundLedger::new());
    let provider = Arc::new(DemoRefundProvider::new(TEST_ITEM));
    let agent = Arc::new(refund_agent(ledger.clone(), stage_delay));
    let runner = Arc::new(AgentRunner::new(
        provider.clone() as Arc<dyn LlmProvider>,
        10,
    ));
    let adapter = DurableAgentRunner::new(runtime.clone(), runner, agent, ToolContext::new());

    DemoProcess {
        store,
        runtime,
        ledger,
        provider,
        adapter,
    }
}

/// Wait until at least `expected` step records exist for `invocation`.
pub async fn wait_for_steps(process: &DemoProcess, invocation: &str, expected: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if process.store.count_steps(invocation).unwrap() >= expected {
            return;
        }
        if Instant::now() > deadline {
            panic!(
                "timed out waiting for {} step records on '{}'",
                expected, invocation
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
