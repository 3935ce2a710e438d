//! The Agent adapter — one A2A endpoint behind a dispatchable URI.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use artinet_core::a2a::{A2aClient, AgentEngine, SendMessageParams, SendMessageResult};
use artinet_core::call::{AgentCallResult, AgentRequest, AgentResponse};
use artinet_core::error::AgentError;
use artinet_core::options::ExecutionOptions;
use artinet_core::service::{AgentInfo, AgentService};

use crate::local::LocalAgent;

/// Adapter encapsulating one A2A endpoint.
///
/// Wrapping an existing client shares its lifetime with the caller; agents
/// instantiated from an engine are owned and released on `stop()`. The agent
/// card is loaded lazily and exactly once: concurrent first callers observe
/// the same in-flight load.
pub struct AgentAdapter {
    uri: String,
    id: String,
    client: Arc<dyn A2aClient>,
    owned: bool,
    info: OnceCell<AgentInfo>,
}

impl AgentAdapter {
    /// Wrap an existing A2A client. The caller keeps ownership of its
    /// lifetime; `stop()` leaves it untouched.
    pub fn wrap(uri: impl Into<String>, client: Arc<dyn A2aClient>) -> Self {
        Self {
            uri: uri.into(),
            id: Uuid::new_v4().to_string(),
            client,
            owned: false,
            info: OnceCell::new(),
        }
    }

    /// Instantiate an in-process agent from a card and an engine, then wrap
    /// it. The adapter owns the agent and releases it on `stop()`.
    pub fn from_engine(
        uri: impl Into<String>,
        card: AgentInfo,
        engine: Arc<dyn AgentEngine>,
    ) -> Self {
        Self {
            uri: uri.into(),
            id: Uuid::new_v4().to_string(),
            client: Arc::new(LocalAgent::new(card, engine)),
            owned: true,
            info: OnceCell::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The underlying client handle. Wrapping it again yields an adapter
    /// exposing the same uri and info.
    pub fn client(&self) -> Arc<dyn A2aClient> {
        self.client.clone()
    }

    /// The agent card, fetched on first use and cached.
    pub async fn info(&self) -> Result<&AgentInfo, AgentError> {
        self.info
            .get_or_try_init(|| self.client.agent_card())
            .await
    }

    /// The cached card, if the fetch has completed.
    pub fn cached_info(&self) -> Option<&AgentInfo> {
        self.info.get()
    }

    /// The service descriptor for this adapter. Loads the card if needed.
    pub async fn target(&self) -> Result<AgentService, AgentError> {
        let info = self.info().await?;
        Ok(AgentService::new(self.uri.clone(), self.id.clone(), info.clone()))
    }

    /// Execute one agent request.
    ///
    /// Within one parent task, every call to the same agent reuses the same
    /// child task id, and each outgoing message references every child task
    /// recorded for the parent so far. Send failures never propagate; they
    /// come back embedded in the response so the loop can continue.
    pub async fn execute(
        &self,
        request: &AgentRequest,
        options: &ExecutionOptions,
    ) -> Result<AgentResponse, AgentError> {
        if request.uri != self.uri {
            return Err(AgentError::UriMismatch {
                expected: self.uri.clone(),
                got: request.uri.clone(),
            });
        }

        let mut message = request.call.clone().into_message();

        let (child_task_id, sibling_ids) = options
            .tasks
            .child_for(&options.parent_task_id, &self.uri);
        message.task_id = Some(child_task_id);

        let mut refs = sibling_ids;
        refs.extend(options.reference_task_ids.iter().cloned());
        refs.extend(message.reference_task_ids.drain(..));
        dedupe_preserving_order(&mut refs);
        message.reference_task_ids = refs;

        debug!(
            uri = %self.uri,
            task_id = ?message.task_id,
            refs = message.reference_task_ids.len(),
            "Sending agent message"
        );

        let outcome = self
            .client
            .send_message(SendMessageParams { message }, &options.cancel)
            .await;

        let response = match outcome {
            Ok(result) => AgentResponse {
                id: request.id.clone(),
                uri: self.uri.clone(),
                caller_id: request.caller_id.clone(),
                call: request.call.clone(),
                result: match result {
                    SendMessageResult::Task(task) => AgentCallResult::Task(task),
                    SendMessageResult::Message(message) => AgentCallResult::Message(message),
                },
                error: None,
            },
            Err(e) => AgentResponse {
                id: request.id.clone(),
                uri: self.uri.clone(),
                caller_id: request.caller_id.clone(),
                call: request.call.clone(),
                result: AgentCallResult::Text(e.to_string()),
                error: Some(e.to_string()),
            },
        };

        Ok(response)
    }

    /// Release owned resources. Wrapped clients are left untouched.
    pub async fn stop(&self) {
        if self.owned {
            self.client.stop().await;
        }
    }
}

fn dedupe_preserving_order(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|v| seen.insert(v.clone()));
}
