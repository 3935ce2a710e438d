//! In-process A2A agents driven by an [`AgentEngine`].
//!
//! A local agent keeps its own task store so repeated sends against the same
//! task id accumulate history, and referenced tasks contribute theirs. The
//! engine pushes status updates into a channel; `send_message` collects them
//! until the terminal update arrives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use artinet_core::a2a::{
    A2aClient, A2aMessage, A2aTask, AgentEngine, EngineTask, SendMessageParams,
    SendMessageResult, TaskState, TaskStatus, TaskStatusUpdate,
};
use artinet_core::error::AgentError;
use artinet_core::service::AgentInfo;

const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// An agent living inside this process.
pub struct LocalAgent {
    card: AgentInfo,
    engine: Arc<dyn AgentEngine>,
    tasks: Mutex<HashMap<String, A2aTask>>,
    shutdown: CancellationToken,
}

impl LocalAgent {
    pub fn new(card: AgentInfo, engine: Arc<dyn AgentEngine>) -> Self {
        Self {
            card,
            engine,
            tasks: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// History for a task plus the histories of its referenced tasks, with
    /// empty messages filtered out.
    fn harvest_history(&self, task_id: &str, reference_ids: &[String]) -> Vec<A2aMessage> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let mut history = Vec::new();
        for id in reference_ids.iter().filter(|r| r.as_str() != task_id) {
            if let Some(task) = tasks.get(id) {
                history.extend(task.history.iter().cloned());
            }
        }
        if let Some(task) = tasks.get(task_id) {
            history.extend(task.history.iter().cloned());
        }
        history.retain(|m| !m.text().is_empty());
        history
    }

    fn record(&self, task: A2aTask) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.insert(task.id.clone(), task);
    }
}

#[async_trait]
impl A2aClient for LocalAgent {
    async fn agent_card(&self) -> Result<AgentInfo, AgentError> {
        Ok(self.card.clone())
    }

    async fn send_message(
        &self,
        params: SendMessageParams,
        cancel: &CancellationToken,
    ) -> Result<SendMessageResult, AgentError> {
        if self.shutdown.is_cancelled() {
            return Err(AgentError::Stopped);
        }

        let message = params.message;
        let task_id = message
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let history = self.harvest_history(&task_id, &message.reference_task_ids);

        let (tx, mut rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let engine = self.engine.clone();
        let engine_task = EngineTask {
            task_id: task_id.clone(),
            context_id: message.context_id.clone(),
            message: message.clone(),
            history,
        };
        let mut worker = tokio::spawn(async move { engine.run(engine_task, tx).await });

        let mut last_update: Option<TaskStatusUpdate> = None;
        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    worker.abort();
                    return Err(AgentError::Cancelled);
                }
                update = rx.recv() => match update {
                    Some(update) => {
                        let is_final = update.is_final;
                        last_update = Some(update);
                        if is_final {
                            break (&mut worker).await;
                        }
                    }
                    // Engine dropped its sink; wait for its result
                    None => break (&mut worker).await,
                },
            }
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) if e.is_cancelled() => return Err(AgentError::Cancelled),
            Err(e) => return Err(AgentError::SendFailed(e.to_string())),
        }

        let status = match last_update {
            Some(update) => update.status,
            // An engine that produced nothing is indistinguishable from a
            // vanished remote
            None => return Err(AgentError::SendFailed("unknown error".into())),
        };

        let mut history: Vec<A2aMessage> = {
            let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.get(&task_id).map(|t| t.history.clone()).unwrap_or_default()
        };
        history.push(message.clone());
        if let Some(reply) = &status.message {
            history.push(reply.clone());
        }

        let task = A2aTask {
            id: task_id,
            context_id: message.context_id,
            status,
            history,
        };
        self.record(task.clone());

        debug!(task_id = %task.id, state = ?task.status.state, "Local agent task updated");
        Ok(SendMessageResult::Task(task))
    }

    async fn stop(&self) {
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.clear();
    }
}

/// Convenience for engines: a working / completed / failed status update.
pub fn status_update(
    task_id: &str,
    context_id: Option<&str>,
    state: TaskState,
    message: Option<A2aMessage>,
    is_final: bool,
) -> TaskStatusUpdate {
    TaskStatusUpdate {
        task_id: task_id.to_string(),
        context_id: context_id.map(str::to_string),
        status: TaskStatus::new(state, message),
        is_final,
    }
}
