//! Callable registry and bounded-concurrency dispatcher.
//!
//! The registry maps a service URI to its adapter. `call` fans a batch of
//! requests out under a semaphore and settles: an individual failure is
//! logged and skipped, never aborting its peers. Response order is
//! unspecified; callers correlate by `response.id`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use artinet_agents::AgentAdapter;
use artinet_core::call::{CallRequest, CallResponse};
use artinet_core::options::ExecutionOptions;
use artinet_tools::ToolAdapter;

/// Either adapter kind, the uniform target of dispatch.
#[derive(Clone)]
pub enum Callable {
    Agent(Arc<AgentAdapter>),
    Tool(Arc<ToolAdapter>),
}

impl Callable {
    pub fn uri(&self) -> &str {
        match self {
            Self::Agent(a) => a.uri(),
            Self::Tool(t) => t.uri(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Agent(_) => "agent",
            Self::Tool(_) => "tool",
        }
    }

    async fn stop(&self) {
        match self {
            Self::Agent(a) => a.stop().await,
            Self::Tool(t) => t.stop().await,
        }
    }
}

type Registry = Arc<RwLock<HashMap<String, Callable>>>;

/// Registry of callables keyed by URI, plus the fan-out dispatcher.
pub struct Manager {
    callables: Registry,
    concurrency: usize,
}

impl Manager {
    pub fn new(concurrency: usize) -> Self {
        Self {
            callables: Arc::new(RwLock::new(HashMap::new())),
            concurrency: concurrency.max(1),
        }
    }

    /// Add or replace a callable.
    pub fn set(&self, uri: impl Into<String>, callable: Callable) {
        let uri = uri.into();
        debug!(uri = %uri, kind = callable.kind(), "Registered callable");
        let mut map = self.callables.write().unwrap_or_else(|e| e.into_inner());
        map.insert(uri, callable);
    }

    pub fn get(&self, uri: &str) -> Option<Callable> {
        let map = self.callables.read().unwrap_or_else(|e| e.into_inner());
        map.get(uri).cloned()
    }

    pub fn delete(&self, uri: &str) -> Option<Callable> {
        let mut map = self.callables.write().unwrap_or_else(|e| e.into_inner());
        map.remove(uri)
    }

    pub fn list(&self) -> Vec<Callable> {
        let map = self.callables.read().unwrap_or_else(|e| e.into_inner());
        map.values().cloned().collect()
    }

    pub fn uris(&self) -> Vec<String> {
        let map = self.callables.read().unwrap_or_else(|e| e.into_inner());
        map.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let map = self.callables.read().unwrap_or_else(|e| e.into_inner());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every callable in parallel.
    pub async fn stop(&self) {
        let callables = self.list();
        join_all(callables.iter().map(|c| c.stop())).await;
    }

    /// Dispatch a batch of requests.
    ///
    /// At most `min(concurrency, requests.len())` invocations run at once;
    /// the bound is private to this one call. Unknown URIs, kind mismatches,
    /// and adapter errors are logged and produce no response.
    pub async fn call(
        &self,
        requests: Vec<CallRequest>,
        options: &ExecutionOptions,
    ) -> Vec<CallResponse> {
        if requests.is_empty() {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency.min(requests.len())));
        let mut set = JoinSet::new();

        for request in requests {
            let semaphore = semaphore.clone();
            let registry = self.callables.clone();
            let options = options.clone();

            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;

                let callable = {
                    let map = registry.read().unwrap_or_else(|e| e.into_inner());
                    map.get(request.uri()).cloned()
                };
                let Some(callable) = callable else {
                    warn!(uri = %request.uri(), "No callable registered for request uri");
                    return None;
                };

                match (&callable, &request) {
                    (Callable::Agent(agent), CallRequest::Agent(req)) => {
                        match agent.execute(req, &options).await {
                            Ok(response) => Some(CallResponse::Agent(response)),
                            Err(e) => {
                                warn!(uri = %req.uri, error = %e, "Agent execution rejected");
                                None
                            }
                        }
                    }
                    (Callable::Tool(tool), CallRequest::Tool(req)) => {
                        match tool.execute(req, &options).await {
                            Ok(response) => Some(CallResponse::Tool(response)),
                            Err(e) => {
                                warn!(uri = %req.uri, error = %e, "Tool execution rejected");
                                None
                            }
                        }
                    }
                    _ => {
                        warn!(
                            uri = %request.uri(),
                            callable_kind = callable.kind(),
                            "Request kind does not match callable kind"
                        );
                        None
                    }
                }
            });
        }

        let mut responses = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(response)) => responses.push(response),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Dispatch task failed"),
            }
        }
        responses
    }
}
