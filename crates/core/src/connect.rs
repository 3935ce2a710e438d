//! ConnectRequest / ConnectResponse — the provider round-trip shapes.
//!
//! The request carries discovered services plus the responses accumulated so
//! far; the response mirrors it with fresh requests. Empty request lists mean
//! the model considers the turn final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::call::{AgentRequest, AgentResponse, ToolRequest, ToolResponse};
use crate::message::Message;
use crate::service::{AgentService, ToolService};

/// Tool-side request options: discovered services and accumulated responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsRequestOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ToolService>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<ToolResponse>,
}

/// Agent-side request options, symmetrical to [`ToolsRequestOptions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentsRequestOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<AgentService>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<AgentResponse>,
}

/// Options attached to a [`ConnectRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub tools: ToolsRequestOptions,

    #[serde(default)]
    pub agents: AgentsRequestOptions,

    /// Provider endpoint preference, passed through opaquely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Auth flag, passed through opaquely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
}

/// What the provider receives on every round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// LLM model identifier
    pub model: String,

    pub messages: Vec<Message>,

    #[serde(default)]
    pub options: RequestOptions,
}

impl ConnectRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: RequestOptions::default(),
        }
    }
}

/// Tool requests emitted by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsResponseOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<ToolRequest>,
}

/// Agent requests emitted by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentsResponseOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<AgentRequest>,
}

/// Options attached to a [`ConnectResponse`]. Omitted lists are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseOptions {
    #[serde(default)]
    pub tools: ToolsResponseOptions,

    #[serde(default)]
    pub agents: AgentsResponseOptions,
}

impl ResponseOptions {
    /// Whether the model emitted any calls this turn.
    pub fn has_requests(&self) -> bool {
        !self.tools.requests.is_empty() || !self.agents.requests.is_empty()
    }
}

/// What the provider returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub timestamp: DateTime<Utc>,

    /// Final assistant message; content may be empty
    pub message: Message,

    #[serde(default)]
    pub options: ResponseOptions,
}

impl ConnectResponse {
    /// A response carrying just an assistant message and no calls.
    pub fn message(message: Message) -> Self {
        Self {
            timestamp: Utc::now(),
            message,
            options: ResponseOptions::default(),
        }
    }
}
