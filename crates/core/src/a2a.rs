//! Agent-to-Agent (A2A) protocol types and contracts.
//!
//! An A2A endpoint accepts `message/send` requests whose payload carries a
//! structured message with text parts, a task correlation id, and references
//! to sibling tasks. Remote endpoints and in-process agents implement the
//! same [`A2aClient`] contract so the adapter layer never cares which it is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AgentError;
use crate::service::AgentInfo;

/// Role of an A2A message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum A2aRole {
    User,
    Agent,
}

/// One content part of an A2A message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: serde_json::Value },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The text of this part, if it is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Data { .. } => None,
        }
    }
}

/// A structured A2A message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aMessage {
    pub role: A2aRole,

    pub parts: Vec<Part>,

    pub message_id: String,

    /// Child task this message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,

    /// Sibling tasks spawned for the same parent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_task_ids: Vec<String>,
}

impl A2aMessage {
    /// Build a user message carrying a single text part.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            role: A2aRole::User,
            parts: vec![Part::text(text)],
            message_id: Uuid::new_v4().to_string(),
            task_id: None,
            context_id: None,
            reference_task_ids: Vec::new(),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Lifecycle state of an A2A task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
    Canceled,
}

/// Status snapshot of an A2A task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<A2aMessage>,

    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    pub fn new(state: TaskState, message: Option<A2aMessage>) -> Self {
        Self {
            state,
            message,
            timestamp: Utc::now(),
        }
    }
}

/// An A2A task: correlation id, status, and accumulated history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aTask {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,

    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<A2aMessage>,
}

/// A progress event pushed by an agent engine while a task runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdate {
    pub task_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,

    pub status: TaskStatus,

    /// Whether this is the terminal update for the task
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Parameters of the A2A `message/send` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageParams {
    pub message: A2aMessage,
}

/// Success value of `message/send`: either a task snapshot or a bare message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendMessageResult {
    Task(A2aTask),
    Message(A2aMessage),
}

impl SendMessageResult {
    /// Final text carried by this result, if any.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Message(m) => Some(m.text()),
            Self::Task(t) => t.status.message.as_ref().map(A2aMessage::text),
        }
    }
}

/// The A2A client contract.
///
/// Remote endpoints and in-process agents both implement this; the agent
/// adapter dispatches through it without knowing which side of the wire it
/// is on.
#[async_trait]
pub trait A2aClient: Send + Sync {
    /// Fetch the agent card describing this endpoint.
    async fn agent_card(&self) -> Result<AgentInfo, AgentError>;

    /// Send a message, honouring the cancellation token.
    async fn send_message(
        &self,
        params: SendMessageParams,
        cancel: &CancellationToken,
    ) -> Result<SendMessageResult, AgentError>;

    /// Release resources owned by this client. Wrapped remote handles are
    /// left untouched by callers; only owners invoke this.
    async fn stop(&self);
}

/// Sink an engine pushes task status updates into.
pub type EngineSink = mpsc::Sender<TaskStatusUpdate>;

/// The unit of work handed to an agent engine.
#[derive(Debug, Clone)]
pub struct EngineTask {
    pub task_id: String,
    pub context_id: Option<String>,
    /// The triggering message
    pub message: A2aMessage,
    /// Prior history harvested from the task and its referenced tasks
    pub history: Vec<A2aMessage>,
}

/// Execution engine of an in-process agent.
///
/// Engines push [`TaskStatusUpdate`]s into the sink as they work; the final
/// update must have `is_final` set. Expressed as a push sink rather than a
/// generator so the runtime can collect updates concurrently.
#[async_trait]
pub trait AgentEngine: Send + Sync {
    async fn run(&self, task: EngineTask, sink: EngineSink) -> Result<(), AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_from_text_has_single_part() {
        let msg = A2aMessage::from_text("hello");
        assert_eq!(msg.role, A2aRole::User);
        assert_eq!(msg.parts.len(), 1);
        assert_eq!(msg.text(), "hello");
        assert!(!msg.message_id.is_empty());
    }

    #[test]
    fn message_serializes_camel_case() {
        let mut msg = A2aMessage::from_text("x");
        msg.task_id = Some("t1".into());
        msg.reference_task_ids = vec!["t0".into()];
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""taskId":"t1""#));
        assert!(json.contains(r#""referenceTaskIds":["t0"]"#));
        assert!(json.contains(r#""messageId""#));
    }

    #[test]
    fn task_state_kebab_case() {
        let json = serde_json::to_string(&TaskState::InputRequired).unwrap();
        assert_eq!(json, r#""input-required""#);
    }

    #[test]
    fn send_result_text_from_task_status() {
        let task = A2aTask {
            id: "t1".into(),
            context_id: None,
            status: TaskStatus::new(
                TaskState::Completed,
                Some(A2aMessage::from_text("done")),
            ),
            history: vec![],
        };
        assert_eq!(SendMessageResult::Task(task).text().as_deref(), Some("done"));
    }

    #[test]
    fn send_result_roundtrip_is_untagged() {
        let msg = SendMessageResult::Message(A2aMessage::from_text("hi"));
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: SendMessageResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
