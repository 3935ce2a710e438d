//! OpenAI-shaped chat-completion adapter.
//!
//! Bridges the connect contract onto a `/chat/completions` endpoint: every
//! discovered tool and agent is encoded as a "function tool" whose name
//! packs the kind, a shortened uri, and the symbol (`{kind}_-_{shortUri}_-_{symbol}`).
//! Accumulated responses are replayed as assistant `tool_calls` plus tool
//! result messages before the next turn, and the model's `tool_calls` are
//! decoded back into tool/agent requests.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use artinet_core::call::{
    AgentCall, AgentCallResult, AgentRequest, ToolCallSpec, ToolRequest,
};
use artinet_core::connect::{ConnectRequest, ConnectResponse, ResponseOptions};
use artinet_core::error::ProviderError;
use artinet_core::mcp::ToolContent;
use artinet_core::message::{Message, Role};
use artinet_core::provider::Provider;

const NAME_SEPARATOR: &str = "_-_";
const SHORT_URI_MAX: usize = 48;
const AGENT_SYMBOL: &str = "send_message";
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A provider adapting the connect contract to an OpenAI-compatible chat API.
pub struct OpenAiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Convenience constructor for the OpenAI platform itself.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }
}

/// Shorten a uri into a name-safe fragment.
fn short_uri(uri: &str) -> String {
    let stripped = uri
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(uri);
    let mut short: String = stripped
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    short.truncate(SHORT_URI_MAX);
    short.trim_matches('-').to_string()
}

fn encode_name(kind: &str, uri: &str, symbol: &str) -> String {
    format!("{kind}{NAME_SEPARATOR}{}{NAME_SEPARATOR}{symbol}", short_uri(uri))
}

/// Split an encoded function name back into (kind, shortUri, symbol).
fn decode_name(name: &str) -> Option<(&str, &str, &str)> {
    let (kind, rest) = name.split_once(NAME_SEPARATOR)?;
    let (uri, symbol) = rest.split_once(NAME_SEPARATOR)?;
    Some((kind, uri, symbol))
}

/// Resolve a shortened uri back to the full uri of a known service.
fn resolve_uri<'a>(short: &str, uris: impl Iterator<Item = &'a str>) -> Option<String> {
    uris.into_iter()
        .find(|uri| short_uri(uri) == short)
        .map(str::to_string)
}

fn encode_services(request: &ConnectRequest) -> Vec<ApiToolDefinition> {
    let mut functions = Vec::new();

    for service in &request.options.tools.services {
        for tool in &service.info.tools {
            functions.push(ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: encode_name("tool", &service.uri, &tool.name),
                    description: tool.description.clone().unwrap_or_else(|| {
                        format!("Tool {} served by {}", tool.name, service.uri)
                    }),
                    parameters: tool.input_schema.clone(),
                },
            });
        }
    }

    for service in &request.options.agents.services {
        let description = if service.info.description.is_empty() {
            format!("Send a message to the {} agent", service.info.name)
        } else {
            service.info.description.clone()
        };
        functions.push(ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: encode_name("agent", &service.uri, AGENT_SYMBOL),
                description,
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "message": {
                            "type": "string",
                            "description": "The message to send to the agent"
                        }
                    },
                    "required": ["message"]
                }),
            },
        });
    }

    functions
}

fn tool_result_text(response: &artinet_core::call::ToolResponse) -> String {
    let text: Vec<&str> = response
        .result
        .content
        .iter()
        .filter_map(|c| match c {
            ToolContent::Text { text } => Some(text.as_str()),
            ToolContent::Image { .. } => None,
        })
        .collect();
    text.join("\n")
}

fn agent_result_text(response: &artinet_core::call::AgentResponse) -> String {
    match &response.result {
        AgentCallResult::Task(task) => task
            .status
            .message
            .as_ref()
            .map(|m| m.text())
            .unwrap_or_default(),
        AgentCallResult::Message(message) => message.text(),
        AgentCallResult::Text(text) => text.clone(),
    }
}

/// Rebuild the chat transcript: base messages, then one assistant message
/// replaying the accumulated `tool_calls`, then their results as tool
/// messages.
fn build_api_messages(request: &ConnectRequest) -> Vec<ApiMessage> {
    let mut messages: Vec<ApiMessage> = request
        .messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::User => "user".into(),
                Role::Assistant => "assistant".into(),
                Role::System => "system".into(),
            },
            content: Some(m.content.clone()),
            tool_calls: None,
            tool_call_id: None,
        })
        .collect();

    let mut replayed_calls = Vec::new();
    let mut results = Vec::new();

    for response in &request.options.tools.responses {
        replayed_calls.push(ApiToolCall {
            id: response.caller_id.clone(),
            r#type: "function".into(),
            function: ApiFunction {
                name: encode_name("tool", &response.uri, &response.call.name),
                arguments: response.call.arguments.to_string(),
            },
        });
        results.push(ApiMessage {
            role: "tool".into(),
            content: Some(tool_result_text(response)),
            tool_calls: None,
            tool_call_id: Some(response.caller_id.clone()),
        });
    }

    for response in &request.options.agents.responses {
        let arguments = match &response.call {
            AgentCall::Text(text) => serde_json::json!({ "message": text }).to_string(),
            AgentCall::Message(message) => {
                serde_json::json!({ "message": message.text() }).to_string()
            }
        };
        replayed_calls.push(ApiToolCall {
            id: response.caller_id.clone(),
            r#type: "function".into(),
            function: ApiFunction {
                name: encode_name("agent", &response.uri, AGENT_SYMBOL),
                arguments,
            },
        });
        results.push(ApiMessage {
            role: "tool".into(),
            content: Some(agent_result_text(response)),
            tool_calls: None,
            tool_call_id: Some(response.caller_id.clone()),
        });
    }

    if !replayed_calls.is_empty() {
        messages.push(ApiMessage {
            role: "assistant".into(),
            content: None,
            tool_calls: Some(replayed_calls),
            tool_call_id: None,
        });
        messages.extend(results);
    }

    messages
}

/// Decode the model's tool calls back into connect-level requests.
fn decode_tool_calls(request: &ConnectRequest, calls: &[ApiToolCall]) -> ResponseOptions {
    let mut options = ResponseOptions::default();

    for call in calls {
        let Some((kind, short, symbol)) = decode_name(&call.function.name) else {
            warn!(name = %call.function.name, "Undecodable function name from model");
            continue;
        };
        let arguments: Value = serde_json::from_str(&call.function.arguments)
            .unwrap_or_else(|_| serde_json::json!({}));

        match kind {
            "tool" => {
                let Some(uri) = resolve_uri(
                    short,
                    request.options.tools.services.iter().map(|s| s.uri.as_str()),
                ) else {
                    warn!(short, "Tool call references an unknown service uri");
                    continue;
                };
                options.tools.requests.push(ToolRequest {
                    id: call.id.clone(),
                    uri,
                    caller_id: call.id.clone(),
                    call: ToolCallSpec {
                        name: symbol.to_string(),
                        arguments,
                    },
                });
            }
            "agent" => {
                let Some(uri) = resolve_uri(
                    short,
                    request.options.agents.services.iter().map(|s| s.uri.as_str()),
                ) else {
                    warn!(short, "Agent call references an unknown service uri");
                    continue;
                };
                let message = arguments
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| call.function.arguments.clone());
                options.agents.requests.push(AgentRequest {
                    id: call.id.clone(),
                    uri,
                    caller_id: call.id.clone(),
                    call: AgentCall::Text(message),
                });
            }
            other => warn!(kind = other, "Unknown function kind from model"),
        }
    }

    options
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(
        &self,
        request: ConnectRequest,
        cancel: &CancellationToken,
    ) -> Result<ConnectResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": build_api_messages(&request),
        });
        let functions = encode_services(&request);
        if !functions.is_empty() {
            body["tools"] = serde_json::json!(functions);
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let send = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = send => result.map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let status_text = status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string();
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                status_text,
                body,
            });
        }

        let api_response: ApiResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            parsed = response.json() => parsed.map_err(|e| ProviderError::Malformed(e.to_string()))?,
        };

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("no choices in response".into()))?;

        let options = decode_tool_calls(
            &request,
            choice.message.tool_calls.as_deref().unwrap_or(&[]),
        );

        Ok(ConnectResponse {
            timestamp: Utc::now(),
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            options,
        })
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use artinet_core::call::{AgentResponse, ToolResponse};
    use artinet_core::mcp::{CallToolResult, Implementation, ServerCapabilities, ToolDescriptor};
    use artinet_core::service::{AgentInfo, AgentService, ToolInfo, ToolService};

    fn tool_service(uri: &str) -> ToolService {
        ToolService::new(
            uri,
            "id-t",
            ToolInfo {
                implementation: Implementation {
                    name: "calc".into(),
                    version: "1.0.0".into(),
                },
                capabilities: ServerCapabilities::default(),
                tools: vec![ToolDescriptor {
                    name: "add".into(),
                    description: Some("Add two numbers".into()),
                    input_schema: serde_json::json!({"type": "object"}),
                }],
                resources: vec![],
                prompts: vec![],
                instructions: None,
            },
        )
    }

    fn agent_service(uri: &str) -> AgentService {
        AgentService::new(
            uri,
            "id-a",
            AgentInfo {
                name: "echo".into(),
                description: "Echoes input".into(),
                url: format!("http://{uri}.test"),
                skills: vec![],
            },
        )
    }

    fn request_with_services() -> ConnectRequest {
        let mut request = ConnectRequest::new("gpt-test", vec![Message::user("hi")]);
        request.options.tools.services.push(tool_service("calc-server"));
        request.options.agents.services.push(agent_service("echo"));
        request
    }

    #[test]
    fn short_uri_strips_scheme_and_symbols() {
        assert_eq!(short_uri("http://example.test/path"), "example-test-path");
        assert_eq!(short_uri("calc-server"), "calc-server");
        let long = "x".repeat(100);
        assert!(short_uri(&long).len() <= SHORT_URI_MAX);
    }

    #[test]
    fn encoded_names_decode_back() {
        let name = encode_name("tool", "calc-server", "add");
        assert_eq!(name, "tool_-_calc-server_-_add");
        let (kind, uri, symbol) = decode_name(&name).unwrap();
        assert_eq!(kind, "tool");
        assert_eq!(uri, "calc-server");
        assert_eq!(symbol, "add");
    }

    #[test]
    fn services_encode_one_function_per_tool_plus_agents() {
        let request = request_with_services();
        let functions = encode_services(&request);
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].function.name, "tool_-_calc-server_-_add");
        assert_eq!(functions[1].function.name, "agent_-_echo_-_send_message");
    }

    #[test]
    fn responses_are_replayed_as_tool_calls() {
        let mut request = request_with_services();
        request.options.tools.responses.push(ToolResponse {
            id: "r1".into(),
            uri: "calc-server".into(),
            caller_id: "call_1".into(),
            call: ToolCallSpec {
                name: "add".into(),
                arguments: serde_json::json!({"a": 1, "b": 2}),
            },
            result: CallToolResult::text("3"),
            error: None,
        });
        request.options.agents.responses.push(AgentResponse {
            id: "r2".into(),
            uri: "echo".into(),
            caller_id: "call_2".into(),
            call: AgentCall::Text("hello".into()),
            result: AgentCallResult::Text("Echo: hello".into()),
            error: None,
        });

        let messages = build_api_messages(&request);
        // user + assistant(tool_calls) + two tool results
        assert_eq!(messages.len(), 4);

        let assistant = &messages[1];
        assert_eq!(assistant.role, "assistant");
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[1].function.name, "agent_-_echo_-_send_message");

        assert_eq!(messages[2].role, "tool");
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[2].content.as_deref(), Some("3"));
        assert_eq!(messages[3].content.as_deref(), Some("Echo: hello"));
    }

    #[test]
    fn tool_calls_decode_into_requests() {
        let request = request_with_services();
        let calls = vec![
            ApiToolCall {
                id: "call_a".into(),
                r#type: "function".into(),
                function: ApiFunction {
                    name: "tool_-_calc-server_-_add".into(),
                    arguments: r#"{"a": 2, "b": 3}"#.into(),
                },
            },
            ApiToolCall {
                id: "call_b".into(),
                r#type: "function".into(),
                function: ApiFunction {
                    name: "agent_-_echo_-_send_message".into(),
                    arguments: r#"{"message": "hi there"}"#.into(),
                },
            },
        ];

        let options = decode_tool_calls(&request, &calls);
        assert_eq!(options.tools.requests.len(), 1);
        assert_eq!(options.agents.requests.len(), 1);

        let tool = &options.tools.requests[0];
        assert_eq!(tool.id, "call_a");
        assert_eq!(tool.uri, "calc-server");
        assert_eq!(tool.call.name, "add");
        assert_eq!(tool.call.arguments["b"], 3);

        let agent = &options.agents.requests[0];
        assert_eq!(agent.uri, "echo");
        assert_eq!(agent.call, AgentCall::Text("hi there".into()));
    }

    #[test]
    fn unknown_service_uris_are_skipped() {
        let request = request_with_services();
        let calls = vec![ApiToolCall {
            id: "call_x".into(),
            r#type: "function".into(),
            function: ApiFunction {
                name: "tool_-_ghost-server_-_run".into(),
                arguments: "{}".into(),
            },
        }];
        let options = decode_tool_calls(&request, &calls);
        assert!(!options.has_requests());
    }

    #[test]
    fn undecodable_names_are_skipped() {
        let request = request_with_services();
        let calls = vec![ApiToolCall {
            id: "call_x".into(),
            r#type: "function".into(),
            function: ApiFunction {
                name: "plain_function".into(),
                arguments: "{}".into(),
            },
        }];
        let options = decode_tool_calls(&request, &calls);
        assert!(!options.has_requests());
    }
}
