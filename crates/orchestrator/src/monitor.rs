//! Monitor — the event bus aggregating update/error emissions across
//! execution contexts.
//!
//! Each context carries its own publisher; the monitor relays context events
//! onto a single broadcast channel. Relays are spawned tasks whose handles
//! are kept, so replacing or deleting a context aborts exactly the relays
//! that were wired for it and nothing dangles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use artinet_core::event::{ExecutionEvent, ProgressState};

const BUS_CAPACITY: usize = 256;

/// One execution context: an id plus its own event publisher.
pub struct Context {
    id: String,
    events: broadcast::Sender<ExecutionEvent>,
}

impl Context {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(BUS_CAPACITY);
        Arc::new(Self {
            id: id.into(),
            events,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Publish a progress update.
    pub fn update(&self, state: impl Into<ProgressState>, update: Option<serde_json::Value>) {
        // No subscribers is fine
        let _ = self.events.send(ExecutionEvent::Update {
            context_id: self.id.clone(),
            state: state.into(),
            update,
        });
    }

    /// Publish an error.
    pub fn error(&self, message: impl Into<String>, state: Option<ProgressState>) {
        let _ = self.events.send(ExecutionEvent::Error {
            context_id: self.id.clone(),
            message: message.into(),
            state,
        });
    }

    fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }
}

struct ContextEntry {
    context: Arc<Context>,
    relay: JoinHandle<()>,
}

impl ContextEntry {
    fn unwire(&self) {
        self.relay.abort();
    }
}

/// Aggregates events from every registered context onto one subscriber
/// surface.
pub struct Monitor {
    contexts: Mutex<HashMap<String, ContextEntry>>,
    bus: broadcast::Sender<ExecutionEvent>,
}

impl Monitor {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            contexts: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Construct a new context and wire it.
    pub fn create(&self, id: impl Into<String>) -> Arc<Context> {
        let context = Context::new(id);
        self.set(context.clone());
        context
    }

    /// Wire a context, unwiring any previous context under the same id
    /// first so no stale relay keeps running.
    pub fn set(&self, context: Arc<Context>) {
        let relay = self.spawn_relay(&context);
        let entry = ContextEntry { context, relay };

        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = contexts.insert(entry.context.id().to_string(), entry) {
            previous.unwire();
        }
    }

    /// Unwire and remove a context.
    pub fn delete(&self, id: &str) -> Option<Arc<Context>> {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts.remove(id).map(|entry| {
            entry.unwire();
            entry.context
        })
    }

    pub fn get(&self, id: &str) -> Option<Arc<Context>> {
        let contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts.get(id).map(|entry| entry.context.clone())
    }

    pub fn context_ids(&self) -> Vec<String> {
        let contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts.keys().cloned().collect()
    }

    /// Subscribe to the aggregated event stream. Subscribers pull from their
    /// own receiver, so a slow subscriber never blocks its peers.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.bus.subscribe()
    }

    /// Unwire everything.
    pub fn clear(&self) {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in contexts.drain() {
            entry.unwire();
        }
    }

    fn spawn_relay(&self, context: &Arc<Context>) -> JoinHandle<()> {
        let mut rx = context.subscribe();
        let bus = self.bus.clone();
        let id = context.id().to_string();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = bus.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(context = %id, skipped, "Relay lagged behind context events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in contexts.drain() {
            entry.unwire();
        }
    }
}
