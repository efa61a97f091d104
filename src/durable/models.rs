//! Data model for durable workflow execution.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a workflow invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Pending => "pending",
            InvocationStatus::Running => "running",
            InvocationStatus::Completed => "completed",
            InvocationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InvocationStatus::Pending),
            "running" => Some(InvocationStatus::Running),
            "completed" => Some(InvocationStatus::Completed),
            "failed" => Some(InvocationStatus::Failed),
            _ => None,
        }
    }

    /// True for completed and failed invocations.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationStatus::Completed | InvocationStatus::Failed)
    }
}

/// One run of a registered workflow, keyed by its caller-supplied identity.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Invocation identity: correlates a resumed run with its persisted
    /// progress.
    pub id: String,
    /// Name of the registered workflow this invocation runs.
    pub workflow: String,
    /// Input payload recorded at creation; resumed runs replay this input.
    pub input: serde_json::Value,
    pub status: InvocationStatus,
    /// Final output, set when the invocation completes.
    pub output: Option<serde_json::Value>,
    /// Failure message, set when retries are exhausted.
    pub error: Option<String>,
    /// Number of times a process has driven this invocation.
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A checkpointed unit of work inside an invocation.
///
/// Immutable once written: replay returns the recorded output instead of
/// re-executing the step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub invocation_id: String,
    /// Monotonic, 0-based position within the invocation.
    pub step_index: u32,
    pub name: String,
    pub output: serde_json::Value,
    pub created_at: i64,
}

/// Errors from the durable runtime.
#[derive(Debug, Error)]
pub enum DurableError {
    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),

    #[error("invocation '{id}' belongs to workflow '{actual}', not '{requested}'")]
    WorkflowMismatch {
        id: String,
        actual: String,
        requested: String,
    },

    #[error("replay diverged at step {index}: recorded '{recorded}', requested '{requested}'")]
    ReplayDivergence {
        index: u32,
        recorded: String,
        requested: String,
    },

    #[error("step '{name}' failed after {attempts} attempts: {source}")]
    StepExhausted {
        name: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("invocation '{id}' failed: {source}")]
    InvocationFailed {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invocation '{0}' completed without an output payload")]
    MissingOutput(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("payload serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            InvocationStatus::Pending,
            InvocationStatus::Running,
            InvocationStatus::Completed,
            InvocationStatus::Failed,
        ] {
            assert_eq!(InvocationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InvocationStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!InvocationStatus::Pending.is_terminal());
        assert!(!InvocationStatus::Running.is_terminal());
        assert!(InvocationStatus::Completed.is_terminal());
        assert!(InvocationStatus::Failed.is_terminal());
    }
}
