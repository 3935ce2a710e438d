//! Service descriptors — what a discovered tool server or agent endpoint
//! looks like to the provider.
//!
//! A descriptor is only constructed after the underlying connection has
//! loaded its info at least once, so holding one implies the capabilities
//! are known.

use serde::{Deserialize, Serialize};

use crate::mcp::{
    Implementation, PromptDescriptor, ResourceDescriptor, ServerCapabilities, ToolDescriptor,
};

/// Capabilities of one MCP tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Server identity {name, version}
    pub implementation: Implementation,

    pub capabilities: ServerCapabilities,

    /// Never empty for a usable service
    pub tools: Vec<ToolDescriptor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceDescriptor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prompts: Vec<PromptDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// One skill advertised on an agent card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// An agent card: identity and advertised skills of one A2A endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub url: String,

    /// May be empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<AgentSkill>,
}

/// A discovered tool service, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolService {
    /// Discriminator, always `"tool"`
    #[serde(rename = "type", default = "tool_tag")]
    pub kind: String,

    pub uri: String,

    /// Internal registration id
    pub id: String,

    pub info: ToolInfo,
}

fn tool_tag() -> String {
    "tool".into()
}

impl ToolService {
    pub fn new(uri: impl Into<String>, id: impl Into<String>, info: ToolInfo) -> Self {
        Self {
            kind: tool_tag(),
            uri: uri.into(),
            id: id.into(),
            info,
        }
    }
}

/// A discovered agent service, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentService {
    /// Discriminator, always `"agent"`
    #[serde(rename = "type", default = "agent_tag")]
    pub kind: String,

    pub uri: String,

    /// Internal registration id
    pub id: String,

    pub info: AgentInfo,
}

fn agent_tag() -> String {
    "agent".into()
}

impl AgentService {
    pub fn new(uri: impl Into<String>, id: impl Into<String>, info: AgentInfo) -> Self {
        Self {
            kind: agent_tag(),
            uri: uri.into(),
            id: id.into(),
            info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_info() -> ToolInfo {
        ToolInfo {
            implementation: Implementation {
                name: "calc".into(),
                version: "1.0.0".into(),
            },
            capabilities: ServerCapabilities::default(),
            tools: vec![ToolDescriptor {
                name: "add".into(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            }],
            resources: vec![],
            prompts: vec![],
            instructions: None,
        }
    }

    #[test]
    fn tool_service_carries_type_tag() {
        let svc = ToolService::new("calc", "id-1", tool_info());
        let json = serde_json::to_string(&svc).unwrap();
        assert!(json.contains(r#""type":"tool""#));
    }

    #[test]
    fn agent_service_roundtrip() {
        let svc = AgentService::new(
            "echo",
            "id-2",
            AgentInfo {
                name: "echo".into(),
                description: "Echoes input".into(),
                url: "http://localhost:4000".into(),
                skills: vec![],
            },
        );
        let json = serde_json::to_string(&svc).unwrap();
        let parsed: AgentService = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, svc);
    }
}
