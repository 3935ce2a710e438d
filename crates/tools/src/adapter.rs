//! The Tool adapter — one MCP stdio subprocess behind a dispatchable URI.

use std::collections::HashMap;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use artinet_core::call::{CallResponse, ToolRequest, ToolResponse};
use artinet_core::error::ToolError;
use artinet_core::mcp::CallToolResult;
use artinet_core::options::ExecutionOptions;
use artinet_core::service::{ToolInfo, ToolService};

use crate::client::McpClient;

/// Adapter owning one MCP server subprocess.
///
/// Capability discovery is lazy and single-flight: the first `info()` caller
/// runs it, concurrent callers await the same in-flight load, and the result
/// is cached for the adapter's lifetime.
pub struct ToolAdapter {
    uri: String,
    id: String,
    client: McpClient,
    info: OnceCell<ToolInfo>,
}

impl ToolAdapter {
    /// Spawn the server process and complete the MCP handshake.
    pub async fn spawn(
        uri: impl Into<String>,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, ToolError> {
        let client = McpClient::connect(command, args, env).await?;
        Ok(Self {
            uri: uri.into(),
            id: Uuid::new_v4().to_string(),
            client,
            info: OnceCell::new(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Discovered capabilities, running discovery on first use.
    pub async fn info(&self, cancel: &CancellationToken) -> Result<&ToolInfo, ToolError> {
        self.info
            .get_or_try_init(|| self.client.discover(cancel))
            .await
    }

    /// The cached capabilities, if discovery has completed.
    pub fn cached_info(&self) -> Option<&ToolInfo> {
        self.info.get()
    }

    /// The service descriptor for this adapter. Loads info if needed, so a
    /// descriptor always reflects a completed discovery.
    pub async fn target(&self, cancel: &CancellationToken) -> Result<ToolService, ToolError> {
        let info = self.info(cancel).await?;
        Ok(ToolService::new(self.uri.clone(), self.id.clone(), info.clone()))
    }

    /// Invoke a tool on the server.
    ///
    /// While the call is in flight, every stderr buffer the subprocess emits
    /// is forwarded to the options callback as a partial response, so
    /// long-running tools stay observable. Failures never propagate: they are
    /// normalized into an error-flagged result with the captured error
    /// attached.
    pub async fn execute(
        &self,
        request: &ToolRequest,
        options: &ExecutionOptions,
    ) -> Result<ToolResponse, ToolError> {
        if request.uri != self.uri {
            return Err(ToolError::UriMismatch {
                expected: self.uri.clone(),
                got: request.uri.clone(),
            });
        }

        let stderr_listener = options.callback.as_ref().map(|_| self.spawn_stderr_listener(request, options));

        let outcome = self
            .client
            .call_tool(&request.call.name, &request.call.arguments, &options.cancel)
            .await;

        if let Some(listener) = stderr_listener {
            listener.abort();
        }

        let response = match outcome {
            Ok(result) => ToolResponse {
                id: request.id.clone(),
                uri: self.uri.clone(),
                caller_id: request.caller_id.clone(),
                call: request.call.clone(),
                result,
                error: None,
            },
            Err(e) => ToolResponse {
                id: request.id.clone(),
                uri: self.uri.clone(),
                caller_id: request.caller_id.clone(),
                call: request.call.clone(),
                result: CallToolResult::error(format!(
                    "Tool call '{}' with arguments {} failed: {e}",
                    request.call.name, request.call.arguments
                )),
                error: Some(e.to_string()),
            },
        };

        Ok(response)
    }

    fn spawn_stderr_listener(
        &self,
        request: &ToolRequest,
        options: &ExecutionOptions,
    ) -> JoinHandle<()> {
        let mut rx = self.client.subscribe_stderr();
        let callback = options.callback.clone();
        let id = request.id.clone();
        let uri = self.uri.clone();
        let caller_id = request.caller_id.clone();
        let call = request.call.clone();

        tokio::spawn(async move {
            while let Ok(chunk) = rx.recv().await {
                let partial = ToolResponse {
                    id: id.clone(),
                    uri: uri.clone(),
                    caller_id: caller_id.clone(),
                    call: call.clone(),
                    result: CallToolResult::text(chunk),
                    error: None,
                };
                if let Some(callback) = &callback {
                    callback(CallResponse::Tool(partial));
                }
            }
        })
    }

    /// Shut the adapter down, killing the server process.
    pub async fn stop(&self) {
        debug!(uri = %self.uri, "Stopping tool adapter");
        self.client.close().await;
    }
}
