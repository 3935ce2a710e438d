//! Execution options threaded through every internal dispatch.
//!
//! Carries the parent-task correlation, the shared child-task registry, the
//! iteration budget, the cancellation token, and the per-response callback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::call::CallResponse;

/// Per-response sink invoked for every response (including the partial
/// responses a tool adapter synthesizes from subprocess stderr).
pub type ResponseCallback = Arc<dyn Fn(CallResponse) + Send + Sync>;

/// Shared registry mapping parentTaskId → (agent uri → child taskId).
///
/// Repeated calls to the same agent within one parent reuse the same child
/// task. All mutation happens under one lock so concurrent dispatches to the
/// same agent observe a single child id.
#[derive(Clone, Default)]
pub struct SessionTasks {
    inner: Arc<Mutex<HashMap<String, HashMap<String, String>>>>,
}

impl SessionTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the sticky child task for `(parent, uri)`, generating and
    /// recording a fresh id on first use. Returns the child id together with
    /// a snapshot of every child id known for the parent (the new one
    /// included) for use as reference task ids.
    pub fn child_for(&self, parent: &str, uri: &str) -> (String, Vec<String>) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let children = map.entry(parent.to_string()).or_default();
        let child = children
            .entry(uri.to_string())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let refs = children.values().cloned().collect();
        (child, refs)
    }

    /// Look up the recorded child id without creating one.
    pub fn get(&self, parent: &str, uri: &str) -> Option<String> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(parent)?.get(uri).cloned()
    }

    /// All child ids recorded for a parent.
    pub fn children(&self, parent: &str) -> Vec<String> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(parent)
            .map(|children| children.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a parent's entire mapping.
    pub fn remove(&self, parent: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(parent);
    }
}

impl std::fmt::Debug for SessionTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("SessionTasks")
            .field("parents", &map.len())
            .finish()
    }
}

/// Context passed on every internal dispatch.
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Correlates all work performed for one caller turn
    pub parent_task_id: String,

    pub tasks: SessionTasks,

    /// Reactive-loop budget
    pub iterations: u32,

    pub cancel: CancellationToken,

    pub callback: Option<ResponseCallback>,

    /// Caller-supplied reference task ids, merged into outgoing messages
    pub reference_task_ids: Vec<String>,
}

impl ExecutionOptions {
    /// Fresh options for a new caller turn.
    pub fn new(iterations: u32) -> Self {
        Self {
            parent_task_id: Uuid::new_v4().to_string(),
            tasks: SessionTasks::new(),
            iterations,
            cancel: CancellationToken::new(),
            callback: None,
            reference_task_ids: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_task_id = parent.into();
        self
    }

    pub fn with_tasks(mut self, tasks: SessionTasks) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_callback(mut self, callback: ResponseCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Invoke the callback, if any, with a response.
    pub fn emit(&self, response: CallResponse) {
        if let Some(callback) = &self.callback {
            callback(response);
        }
    }
}

impl std::fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("parent_task_id", &self.parent_task_id)
            .field("iterations", &self.iterations)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
