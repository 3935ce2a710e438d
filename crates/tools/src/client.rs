//! MCP client — handshake, capability discovery, and tool invocation over a
//! stdio transport.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use artinet_core::error::ToolError;
use artinet_core::mcp::{CallToolResult, Implementation, ServerCapabilities};
use artinet_core::service::ToolInfo;

use crate::transport::StdioTransport;

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "artinet-tools";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    #[allow(dead_code)]
    protocol_version: String,
    capabilities: ServerCapabilities,
    server_info: Implementation,
    #[serde(default)]
    instructions: Option<String>,
}

/// A connected MCP server: transport plus the handshake results.
pub struct McpClient {
    transport: StdioTransport,
    server_info: Implementation,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
}

impl McpClient {
    /// Spawn the server process and perform the MCP handshake.
    ///
    /// A transient stderr listener logs server output for the duration of the
    /// initialization window and is detached once the handshake completes
    /// (or fails).
    pub async fn connect(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, ToolError> {
        let transport = StdioTransport::spawn(command, args, env).await?;

        let init_logger = spawn_stderr_logger(transport.subscribe_stderr());
        let handshake = Self::handshake(&transport).await;
        init_logger.abort();

        match handshake {
            Ok(init) => {
                debug!(
                    server = %init.server_info.name,
                    version = %init.server_info.version,
                    "MCP handshake complete"
                );
                Ok(Self {
                    transport,
                    server_info: init.server_info,
                    capabilities: init.capabilities,
                    instructions: init.instructions,
                })
            }
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn handshake(transport: &StdioTransport) -> Result<InitializeResult, ToolError> {
        let cancel = CancellationToken::new();
        let result = transport
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": CLIENT_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
                &cancel,
            )
            .await
            .map_err(|e| ToolError::Handshake(e.to_string()))?;

        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| ToolError::Handshake(format!("invalid initialize result: {e}")))?;

        transport
            .notify("notifications/initialized", json!({}))
            .await
            .map_err(|e| ToolError::Handshake(e.to_string()))?;

        Ok(init)
    }

    pub fn server_name(&self) -> &str {
        &self.server_info.name
    }

    /// Subscribe to the server's stderr stream.
    pub fn subscribe_stderr(&self) -> broadcast::Receiver<String> {
        self.transport.subscribe_stderr()
    }

    /// Discover the server's capabilities.
    ///
    /// The server must declare `tools` and list at least one tool; resources
    /// and prompts are paged through only when declared and may be empty.
    pub async fn discover(&self, cancel: &CancellationToken) -> Result<ToolInfo, ToolError> {
        if self.capabilities.tools.is_none() {
            return Err(ToolError::MissingCapability("tools".into()));
        }

        let tools = self.list_paginated("tools/list", "tools", cancel).await?;
        if tools.is_empty() {
            return Err(ToolError::EmptyToolList(self.server_info.name.clone()));
        }

        let resources = if self.capabilities.resources.is_some() {
            self.list_paginated("resources/list", "resources", cancel)
                .await?
        } else {
            Vec::new()
        };

        let prompts = if self.capabilities.prompts.is_some() {
            self.list_paginated("prompts/list", "prompts", cancel).await?
        } else {
            Vec::new()
        };

        Ok(ToolInfo {
            implementation: self.server_info.clone(),
            capabilities: self.capabilities.clone(),
            tools,
            resources,
            prompts,
            instructions: self.instructions.clone(),
        })
    }

    /// Page through a listing endpoint until the server stops returning a
    /// next cursor.
    async fn list_paginated<T: DeserializeOwned>(
        &self,
        method: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, ToolError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let page = self.transport.request(method, params, cancel).await?;

            let page_items: Vec<T> =
                serde_json::from_value(page.get(key).cloned().unwrap_or(Value::Array(vec![])))
                    .map_err(|e| ToolError::Rpc(format!("invalid {method} result: {e}")))?;
            items.extend(page_items);

            match page.get("nextCursor").and_then(Value::as_str) {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        Ok(items)
    }

    /// Invoke one tool on the server.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, ToolError> {
        let result = self
            .transport
            .request(
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
                cancel,
            )
            .await?;

        serde_json::from_value(result)
            .map_err(|e| ToolError::Rpc(format!("invalid tools/call result: {e}")))
    }

    /// Tear down the transport and the server process.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}

fn spawn_stderr_logger(mut rx: broadcast::Receiver<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(chunk) = rx.recv().await {
            error!(stderr = %chunk.trim_end(), "MCP server reported during initialization");
        }
    })
}
