//! Durable workflow execution.
//!
//! Invocations and their step records are persisted in SQLite; completed
//! steps replay from storage instead of re-executing, so an interrupted
//! process resumes from its last recorded step on restart.

mod models;
mod retry;
mod runtime;
mod schema;
mod store;

pub use models::{DurableError, Invocation, InvocationStatus, StepRecord};
pub use retry::RetryPolicy;
pub use runtime::{DurableRuntime, StepContext};
pub use store::{SqliteWorkflowStore, WorkflowStore};
