//! Execution events — what the monitor aggregates across contexts.
//!
//! Events are published when something interesting happens during a turn.
//! Subscribers receive them without coupling to the component that emitted
//! them.

use serde::{Deserialize, Serialize};

use crate::a2a::TaskStatusUpdate;
use crate::call::CallResponse;

/// A generic progress envelope: a task snapshot, a normalized response, or a
/// bare status string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressState {
    Task(TaskStatusUpdate),
    Response(Box<CallResponse>),
    Status(String),
}

impl From<TaskStatusUpdate> for ProgressState {
    fn from(update: TaskStatusUpdate) -> Self {
        Self::Task(update)
    }
}

impl From<CallResponse> for ProgressState {
    fn from(response: CallResponse) -> Self {
        Self::Response(Box::new(response))
    }
}

/// An event aggregated by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
    /// Progress from one context; `update` is the underlying domain update,
    /// when one exists
    Update {
        context_id: String,
        state: ProgressState,
        update: Option<serde_json::Value>,
    },

    /// An error surfaced by one context
    Error {
        context_id: String,
        message: String,
        state: Option<ProgressState>,
    },
}

impl ExecutionEvent {
    pub fn context_id(&self) -> &str {
        match self {
            Self::Update { context_id, .. } | Self::Error { context_id, .. } => context_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
