//! The durable-execution runtime.
//!
//! A [`DurableRuntime`] is an explicit handle created at startup and passed
//! to wherever workflows are registered; there is no process-wide singleton.
//! Registered workflows are driven by [`DurableRuntime::invoke`], which
//! checkpoints progress through the [`StepContext`] handed to the workflow
//! body:
//!
//! - a step whose output is already recorded is replayed from storage, not
//!   re-executed;
//! - a step that executes has its output persisted before the next step
//!   begins (record-then-proceed);
//! - a completed invocation re-invoked under the same identity returns its
//!   recorded result without running anything.
//!
//! Side effects inside a step are at-least-once: a crash after the effect
//! but before the record commits re-executes the step on resume, so
//! side-effecting steps must be idempotent per (invocation id, step index).

use super::models::{DurableError, InvocationStatus};
use super::retry::RetryPolicy;
use super::store::WorkflowStore;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

type WorkflowHandler =
    dyn Fn(StepContext, serde_json::Value) -> BoxFuture<'static, anyhow::Result<serde_json::Value>>
        + Send
        + Sync;

/// Checkpointing handle given to a running workflow body.
///
/// One context exists per driven invocation; its step cursor advances with
/// every [`StepContext::step`] call, so a workflow body must issue the same
/// step sequence on every run given the same recorded outputs.
#[derive(Clone)]
pub struct StepContext {
    inner: Arc<StepContextInner>,
}

struct StepContextInner {
    store: Arc<dyn WorkflowStore>,
    invocation_id: String,
    cursor: AtomicU32,
    retry: RetryPolicy,
}

impl StepContext {
    fn new(store: Arc<dyn WorkflowStore>, invocation_id: String, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(StepContextInner {
                store,
                invocation_id,
                cursor: AtomicU32::new(0),
                retry,
            }),
        }
    }

    /// Identity of the invocation this context belongs to.
    pub fn invocation_id(&self) -> &str {
        &self.inner.invocation_id
    }

    /// Run `op` as the next checkpointed step.
    ///
    /// If a record exists at the current position, its output is returned
    /// and `op` is never called. Otherwise `op` is executed (with retries
    /// per the runtime's [`RetryPolicy`]) and its output is persisted before
    /// this method returns.
    pub async fn step<T, F, Fut>(&self, name: &str, mut op: F) -> Result<T, DurableError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let index = self.inner.cursor.fetch_add(1, Ordering::SeqCst);
        let invocation_id = &self.inner.invocation_id;

        if let Some(record) = self.inner.store.get_step(invocation_id, index)? {
            if record.name != name {
                return Err(DurableError::ReplayDivergence {
                    index,
                    recorded: record.name,
                    requested: name.to_string(),
                });
            }
            debug!(invocation = %invocation_id, step = index, name, "Replaying recorded step");
            return Ok(serde_json::from_value(record.output)?);
        }

        let mut retries = 0;
        loop {
            match op().await {
                Ok(value) => {
                    let output = serde_json::to_value(&value)?;
                    let canonical =
                        self.inner
                            .store
                            .record_step(invocation_id, index, name, &output)?;
                    debug!(invocation = %invocation_id, step = index, name, "Recorded step");
                    return Ok(serde_json::from_value(canonical.output)?);
                }
                Err(e) if retries < self.inner.retry.max_retries => {
                    let backoff = self.inner.retry.backoff(retries);
                    warn!(
                        invocation = %invocation_id,
                        step = index,
                        name,
                        error = %e,
                        retry_in_ms = backoff.as_millis() as u64,
                        "Step failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    retries += 1;
                }
                Err(e) => {
                    return Err(DurableError::StepExhausted {
                        name: name.to_string(),
                        attempts: retries + 1,
                        source: e,
                    });
                }
            }
        }
    }
}

/// The durable-execution runtime: a workflow registry over a
/// [`WorkflowStore`].
pub struct DurableRuntime {
    store: Arc<dyn WorkflowStore>,
    retry: RetryPolicy,
    handlers: RwLock<HashMap<String, Arc<WorkflowHandler>>>,
}

impl DurableRuntime {
    pub fn new(store: Arc<dyn WorkflowStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Register a workflow under `name`.
    ///
    /// The handler receives a [`StepContext`] and the invocation's recorded
    /// input, and must be deterministic given the same recorded step
    /// outputs.
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(StepContext, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let name = name.into();
        let boxed: Arc<WorkflowHandler> = Arc::new(move |ctx, input| Box::pin(handler(ctx, input)));
        self.handlers
            .write()
            .expect("handler registry lock poisoned")
            .insert(name, boxed);
    }

    /// Invoke (or resume, or replay) the workflow invocation `id`.
    ///
    /// - unknown id: a new invocation is created and driven from step 0;
    /// - incomplete or failed id: the invocation is re-driven from its
    ///   recorded input, replaying recorded steps and executing the rest;
    /// - completed id: the recorded final output is returned and nothing
    ///   executes.
    pub async fn invoke(
        &self,
        id: &str,
        workflow: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, DurableError> {
        let input = match self.store.get_invocation(id)? {
            Some(existing) => {
                if existing.workflow != workflow {
                    return Err(DurableError::WorkflowMismatch {
                        id: id.to_string(),
                        actual: existing.workflow,
                        requested: workflow.to_string(),
                    });
                }
                if existing.status == InvocationStatus::Completed {
                    debug!(invocation = %id, "Invocation already completed, replaying output");
                    return existing
                        .output
                        .ok_or_else(|| DurableError::MissingOutput(id.to_string()));
                }
                info!(
                    invocation = %id,
                    workflow,
                    attempts = existing.attempts,
                    recorded_steps = self.store.count_steps(id)?,
                    "Resuming invocation"
                );
                // The recorded input wins over the caller's, so a resumed
                // run sees exactly the arguments of the original one.
                existing.input
            }
            None => {
                self.store.create_invocation(id, workflow, &input)?;
                info!(invocation = %id, workflow, "Created invocation");
                input
            }
        };

        let handler = {
            let handlers = self.handlers.read().expect("handler registry lock poisoned");
            handlers
                .get(workflow)
                .cloned()
                .ok_or_else(|| DurableError::UnknownWorkflow(workflow.to_string()))?
        };

        self.store.mark_running(id)?;
        let ctx = StepContext::new(self.store.clone(), id.to_string(), self.retry.clone());

        match (handler.as_ref())(ctx, input).await {
            Ok(output) => {
                self.store.mark_completed(id, &output)?;
                info!(invocation = %id, workflow, "Invocation completed");
                Ok(output)
            }
            Err(e) => {
                self.store.mark_failed(id, &e.to_string())?;
                warn!(invocation = %id, workflow, error = %e, "Invocation failed");
                Err(DurableError::InvocationFailed {
                    id: id.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Re-drive every invocation that is not in a terminal state.
    ///
    /// Called once at startup so work interrupted by a previous process
    /// picks up where its step records left off.
    pub async fn resume_incomplete(
        &self,
    ) -> Result<Vec<(String, Result<serde_json::Value, DurableError>)>, DurableError> {
        let incomplete = self.store.list_incomplete()?;
        if incomplete.is_empty() {
            return Ok(Vec::new());
        }

        info!(count = incomplete.len(), "Resuming incomplete invocations");
        let mut results = Vec::with_capacity(incomplete.len());
        for invocation in incomplete {
            let result = self
                .invoke(&invocation.id, &invocation.workflow, invocation.input)
                .await;
            if let Err(e) = &result {
                warn!(invocation = %invocation.id, error = %e, "Resumed invocation failed");
            }
            results.push((invocation.id, result));
        }
        Ok(results)
    }
}
