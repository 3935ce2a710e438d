//! Call requests and responses — the structured calls the LLM emits and the
//! normalized results fed back on the next turn.
//!
//! Requests and responses are mirrors of each other; the identity invariant
//! `response.id == request.id` is what lets downstream code treat response
//! lists as sets.

use serde::{Deserialize, Serialize};

use crate::a2a::{A2aMessage, A2aTask};
use crate::mcp::CallToolResult;

/// The tool invocation payload: which tool on the server, with what input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSpec {
    pub name: String,

    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// The agent invocation payload: raw user text or a structured message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentCall {
    Message(Box<A2aMessage>),
    Text(String),
}

impl AgentCall {
    /// Normalize into an outgoing A2A message. Raw text is wrapped as a
    /// single-text-part message; structured messages pass through verbatim,
    /// empty content included.
    pub fn into_message(self) -> A2aMessage {
        match self {
            Self::Message(msg) => *msg,
            Self::Text(text) => A2aMessage::from_text(text),
        }
    }
}

/// A request targeting one MCP tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub id: String,
    pub uri: String,

    /// Id of the originating LLM call
    pub caller_id: String,

    pub call: ToolCallSpec,
}

/// A request targeting one A2A agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub id: String,
    pub uri: String,

    /// Id of the originating LLM call
    pub caller_id: String,

    pub call: AgentCall,
}

/// Result of an agent call: the `message/send` success value, or the failure
/// description when the send did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentCallResult {
    Task(A2aTask),
    Message(A2aMessage),
    Text(String),
}

/// Response mirror of a [`ToolRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    /// Identical to the originating request id
    pub id: String,
    pub uri: String,
    pub caller_id: String,
    pub call: ToolCallSpec,

    pub result: CallToolResult,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response mirror of an [`AgentRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    /// Identical to the originating request id
    pub id: String,
    pub uri: String,
    pub caller_id: String,
    pub call: AgentCall,

    pub result: AgentCallResult,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Discriminated union over the two request kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CallRequest {
    #[serde(rename = "tool_request")]
    Tool(ToolRequest),

    #[serde(rename = "agent_request")]
    Agent(AgentRequest),
}

impl CallRequest {
    pub fn id(&self) -> &str {
        match self {
            Self::Tool(r) => &r.id,
            Self::Agent(r) => &r.id,
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Self::Tool(r) => &r.uri,
            Self::Agent(r) => &r.uri,
        }
    }
}

/// Discriminated union over the two response kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CallResponse {
    #[serde(rename = "tool_response")]
    Tool(ToolResponse),

    #[serde(rename = "agent_response")]
    Agent(AgentResponse),
}

impl CallResponse {
    pub fn id(&self) -> &str {
        match self {
            Self::Tool(r) => &r.id,
            Self::Agent(r) => &r.id,
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Self::Tool(r) => &r.uri,
            Self::Agent(r) => &r.uri,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Tool(r) => r.error.as_deref(),
            Self::Agent(r) => r.error.as_deref(),
        }
    }
}
