//! The Orchestrator facade — composes the manager, monitor, provider, and
//! reactive loop behind a small public surface, and exposes itself as an
//! A2A agent in turn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use artinet_agents::{status_update, AgentAdapter, LocalAgent};
use artinet_core::a2a::{A2aClient, A2aRole, AgentEngine, EngineSink, EngineTask, TaskState};
use artinet_core::connect::RequestOptions;
use artinet_core::error::{AgentError, Error, Result};
use artinet_core::event::ExecutionEvent;
use artinet_core::message::Message;
use artinet_core::options::{ExecutionOptions, SessionTasks};
use artinet_core::provider::Provider;
use artinet_core::service::{AgentInfo, AgentSkill};
use artinet_tools::ToolAdapter;

use crate::config::OrchestratorConfig;
use crate::manager::{Callable, Manager};
use crate::monitor::Monitor;
use crate::normalize::{extract_text, ConnectInput};
use crate::reactive::run_loop;

/// A recognised service definition for `add`.
pub enum ServiceDefinition {
    /// Wrap an existing A2A client handle
    Agent(Arc<dyn A2aClient>),

    /// Instantiate an in-process agent from a card and an engine, then wrap it
    AgentSpec {
        card: AgentInfo,
        engine: Arc<dyn AgentEngine>,
    },

    /// Spawn an MCP stdio tool server
    Tool {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
}

/// Per-connect options.
#[derive(Default, Clone)]
pub struct ConnectOptions {
    /// Override the configured iteration budget
    pub iterations: Option<u32>,

    /// Correlate this turn under an existing parent task
    pub parent_task_id: Option<String>,

    pub reference_task_ids: Vec<String>,

    /// Opaque pass-through: provider endpoint preference
    pub endpoint: Option<String>,

    /// Opaque pass-through: auth flag
    pub authenticated: Option<bool>,
}

struct Inner {
    model: String,
    provider: Arc<dyn Provider>,
    manager: Manager,
    monitor: Monitor,
    config: OrchestratorConfig,
    tasks: SessionTasks,
    cancel: CancellationToken,
    /// Tail of the add chain; each add awaits its predecessor so additions
    /// are serialised, and `connect` awaits the tail.
    add_chain: Mutex<Option<JoinHandle<()>>>,
}

/// The orchestrator facade.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create an orchestrator with knobs read from the environment.
    pub fn new(model: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        Self::with_config(model, provider, OrchestratorConfig::from_env())
    }

    pub fn with_config(
        model: impl Into<String>,
        provider: Arc<dyn Provider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                model: model.into(),
                provider,
                manager: Manager::new(config.concurrency),
                monitor: Monitor::new(),
                config,
                tasks: SessionTasks::new(),
                cancel: CancellationToken::new(),
                add_chain: Mutex::new(None),
            }),
        }
    }

    /// Replace the root cancellation token (the caller's abort signal).
    pub fn with_cancel(self, cancel: CancellationToken) -> Self {
        // Only sound before the orchestrator is shared
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.cancel = cancel;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                warn!("Cancellation token replaced after sharing; keeping the original");
                Self { inner }
            }
        }
    }

    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Queue a service addition under a generated URI. Fluent; `connect`
    /// awaits all queued additions before dispatching.
    pub fn add(&self, definition: ServiceDefinition) -> &Self {
        self.add_as(None, definition)
    }

    /// Queue a service addition under an explicit URI.
    pub fn add_as(&self, uri: Option<String>, definition: ServiceDefinition) -> &Self {
        let inner = self.inner.clone();

        // One lock spans take-and-store so concurrent adds chain instead of
        // racing each other off the tail.
        let mut chain = self.inner.add_chain.lock().unwrap_or_else(|e| e.into_inner());
        let previous = chain.take();
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            if let Err(e) = inner.register(uri, definition).await {
                warn!(error = %e, "Failed to add service");
            }
        });
        *chain = Some(handle);
        self
    }

    /// Run one caller turn to the final assistant text.
    pub async fn connect(&self, input: impl Into<ConnectInput>) -> Result<String> {
        self.connect_with(input, ConnectOptions::default()).await
    }

    /// Run one caller turn with explicit options.
    pub async fn connect_with(
        &self,
        input: impl Into<ConnectInput>,
        options: ConnectOptions,
    ) -> Result<String> {
        let response = self.inner.run_connect(input.into(), options).await?;
        extract_text(&response)
    }

    /// Stop every callable in parallel and unwire the monitor.
    pub async fn close(&self) {
        self.inner.await_pending_adds().await;
        self.inner.manager.stop().await;
        self.inner.monitor.clear();
    }

    /// Subscribe to aggregated update/error events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.inner.monitor.subscribe()
    }

    pub fn monitor(&self) -> &Monitor {
        &self.inner.monitor
    }

    pub fn manager(&self) -> &Manager {
        &self.inner.manager
    }

    /// The session task registry (parentTaskId → uri → childTaskId).
    pub fn tasks(&self) -> &SessionTasks {
        &self.inner.tasks
    }

    /// Derive this orchestrator's agent card: one skill per registered
    /// service.
    pub async fn agent_card(&self) -> Result<AgentInfo> {
        self.inner.await_pending_adds().await;

        let mut skills = Vec::new();
        for callable in self.inner.manager.list() {
            match callable {
                Callable::Tool(tool) => {
                    let service = tool.target(&self.inner.cancel).await.map_err(Error::Tool)?;
                    skills.push(AgentSkill {
                        id: service.uri.clone(),
                        name: service.info.implementation.name.clone(),
                        description: service
                            .info
                            .instructions
                            .clone()
                            .unwrap_or_else(|| format!("Tools served by {}", service.uri)),
                        tags: vec!["tool".into()],
                        examples: vec![],
                    });
                }
                Callable::Agent(agent) => {
                    let service = agent.target().await.map_err(Error::Agent)?;
                    let description = if service.info.description.is_empty() {
                        format!("Agent reachable at {}", service.uri)
                    } else {
                        service.info.description.clone()
                    };
                    skills.push(AgentSkill {
                        id: service.uri.clone(),
                        name: service.info.name.clone(),
                        description,
                        tags: vec!["agent".into()],
                        examples: vec![],
                    });
                }
            }
        }

        let name = format!("{}-agent", self.inner.model);
        Ok(AgentInfo {
            description: format!(
                "An orchestration agent driven by the {} language model",
                self.inner.model
            ),
            url: format!("orchestrator://{name}"),
            name,
            skills,
        })
    }

    /// Expose this orchestrator as an A2A agent. Its engine submits the
    /// task, runs the reactive loop over the new message plus harvested
    /// history, and completes with the final text.
    pub async fn agent(&self) -> Result<AgentAdapter> {
        let card = self.agent_card().await?;
        let engine = Arc::new(OrchestratorEngine {
            inner: Arc::downgrade(&self.inner),
        });
        let uri = card.url.clone();
        let client: Arc<dyn A2aClient> = Arc::new(LocalAgent::new(card, engine));
        Ok(AgentAdapter::wrap(uri, client))
    }
}

impl Inner {
    async fn register(&self, uri: Option<String>, definition: ServiceDefinition) -> Result<()> {
        match definition {
            ServiceDefinition::Agent(client) => {
                let uri = match uri {
                    Some(uri) => uri,
                    None => client
                        .agent_card()
                        .await
                        .map_err(Error::Agent)?
                        .url,
                };
                let adapter = AgentAdapter::wrap(uri.clone(), client);
                self.manager.set(uri, Callable::Agent(Arc::new(adapter)));
            }
            ServiceDefinition::AgentSpec { card, engine } => {
                let uri = uri.unwrap_or_else(|| {
                    if card.url.is_empty() {
                        card.name.clone()
                    } else {
                        card.url.clone()
                    }
                });
                let adapter = AgentAdapter::from_engine(uri.clone(), card, engine);
                self.manager.set(uri, Callable::Agent(Arc::new(adapter)));
            }
            ServiceDefinition::Tool { command, args, env } => {
                let uri = uri.unwrap_or_else(|| {
                    command
                        .rsplit(['/', '\\'])
                        .next()
                        .unwrap_or(command.as_str())
                        .to_string()
                });
                let adapter = ToolAdapter::spawn(uri.clone(), &command, &args, &env)
                    .await
                    .map_err(Error::Tool)?;
                self.manager.set(uri, Callable::Tool(Arc::new(adapter)));
            }
        }
        Ok(())
    }

    async fn await_pending_adds(&self) {
        let tail = {
            let mut chain = self.add_chain.lock().unwrap_or_else(|e| e.into_inner());
            chain.take()
        };
        if let Some(tail) = tail {
            let _ = tail.await;
        }
    }

    /// Assemble request options from the currently registered services.
    async fn service_options(&self, options: &ConnectOptions) -> Result<RequestOptions> {
        let mut request_options = RequestOptions {
            endpoint: options.endpoint.clone(),
            authenticated: options.authenticated,
            ..RequestOptions::default()
        };

        for callable in self.manager.list() {
            match callable {
                Callable::Tool(tool) => {
                    let service = tool.target(&self.cancel).await.map_err(Error::Tool)?;
                    request_options.tools.services.push(service);
                }
                Callable::Agent(agent) => {
                    let service = agent.target().await.map_err(Error::Agent)?;
                    request_options.agents.services.push(service);
                }
            }
        }
        Ok(request_options)
    }

    async fn run_connect(
        &self,
        input: ConnectInput,
        options: ConnectOptions,
    ) -> Result<artinet_core::connect::ConnectResponse> {
        self.await_pending_adds().await;

        let parent_task_id = options
            .parent_task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let request_options = self.service_options(&options).await?;
        let request = input.into_request(&self.model, request_options)?;

        let context = self.monitor.create(parent_task_id.clone());
        let callback_context = context.clone();

        let exec_options = ExecutionOptions {
            parent_task_id,
            tasks: self.tasks.clone(),
            iterations: options.iterations.unwrap_or(self.config.iterations),
            cancel: self.cancel.child_token(),
            callback: Some(Arc::new(move |response| {
                if let Some(error) = response.error() {
                    callback_context.error(error.to_string(), Some(response.clone().into()));
                } else {
                    callback_context.update(response, None);
                }
            })),
            reference_task_ids: options.reference_task_ids.clone(),
        };

        debug!(
            model = %self.model,
            parent = %exec_options.parent_task_id,
            services = self.manager.len(),
            "Starting connect turn"
        );

        let result = run_loop(request, self.provider.as_ref(), &self.manager, &exec_options).await;
        if let Err(e) = &result {
            context.error(e.to_string(), None);
        }
        result
    }
}

/// Engine that runs the orchestrator's own reactive loop for inbound A2A
/// tasks. Holds a weak back-reference so the orchestrator and its agent
/// facade never form an ownership cycle.
struct OrchestratorEngine {
    inner: Weak<Inner>,
}

#[async_trait]
impl AgentEngine for OrchestratorEngine {
    async fn run(
        &self,
        task: EngineTask,
        sink: EngineSink,
    ) -> std::result::Result<(), AgentError> {
        let _ = sink
            .send(status_update(
                &task.task_id,
                task.context_id.as_deref(),
                TaskState::Submitted,
                None,
                false,
            ))
            .await;

        let Some(inner) = self.inner.upgrade() else {
            return Err(AgentError::Stopped);
        };

        // Task history plus the new user message, empties already filtered
        let mut session: Vec<Message> = task
            .history
            .iter()
            .map(|m| match m.role {
                A2aRole::User => Message::user(m.text()),
                A2aRole::Agent => Message::assistant(m.text()),
            })
            .filter(|m| !m.is_empty())
            .collect();
        session.push(Message::user(task.message.text()));

        let options = ConnectOptions {
            parent_task_id: Some(task.task_id.clone()),
            reference_task_ids: task.message.reference_task_ids.clone(),
            ..ConnectOptions::default()
        };

        match inner.run_connect(ConnectInput::Session(session), options).await {
            Ok(response) => {
                let text = extract_text(&response).unwrap_or_default();
                let mut reply = artinet_core::a2a::A2aMessage::from_text(text);
                reply.role = A2aRole::Agent;
                reply.task_id = Some(task.task_id.clone());
                let _ = sink
                    .send(status_update(
                        &task.task_id,
                        task.context_id.as_deref(),
                        TaskState::Completed,
                        Some(reply),
                        true,
                    ))
                    .await;
                Ok(())
            }
            Err(e) => {
                let _ = sink
                    .send(status_update(
                        &task.task_id,
                        task.context_id.as_deref(),
                        TaskState::Failed,
                        None,
                        true,
                    ))
                    .await;
                Err(AgentError::SendFailed(e.to_string()))
            }
        }
    }
}
