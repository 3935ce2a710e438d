//! End-to-end tests for the orchestrator facade: scripted providers driving
//! in-process agents through the full connect pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use artinet_agents::status_update;
use artinet_core::a2a::{A2aRole, AgentEngine, EngineSink, EngineTask, TaskState};
use artinet_core::call::{AgentCall, AgentCallResult, AgentRequest, ToolCallSpec, ToolRequest};
use artinet_core::connect::{ConnectRequest, ConnectResponse};
use artinet_core::error::{AgentError, Error, ProviderError};
use artinet_core::event::{ExecutionEvent, ProgressState};
use artinet_core::message::Message;
use artinet_core::provider::Provider;
use artinet_core::service::AgentInfo;
use artinet_orchestrator::{
    ConnectOptions, Orchestrator, OrchestratorConfig, ServiceDefinition, MAX_ITERATIONS_HINT,
};

// --- Test doubles ---

/// Provider driven by a script of canned responses; records every request.
struct ScriptedProvider {
    script: Mutex<Vec<ConnectResponse>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ConnectRequest>>,
}

impl ScriptedProvider {
    fn new(mut responses: Vec<ConnectResponse>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            script: Mutex::new(responses),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn request(&self, index: usize) -> ConnectRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(
        &self,
        request: ConnectRequest,
        cancel: &CancellationToken,
    ) -> Result<ConnectResponse, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ProviderError::Malformed("script exhausted".into()))
    }
}

/// Engine that replies "Echo: <input>" after an optional delay, tracking
/// in-flight concurrency and the task ids it was given.
struct EchoEngine {
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    invocations: Arc<AtomicUsize>,
    seen_tasks: Arc<Mutex<Vec<EngineTask>>>,
}

impl EchoEngine {
    fn instant() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            invocations: Arc::new(AtomicUsize::new(0)),
            seen_tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl AgentEngine for EchoEngine {
    async fn run(&self, task: EngineTask, sink: EngineSink) -> Result<(), AgentError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.seen_tasks.lock().unwrap().push(task.clone());

        let mut reply =
            artinet_core::a2a::A2aMessage::from_text(format!("Echo: {}", task.message.text()));
        reply.role = A2aRole::Agent;
        let _ = sink
            .send(status_update(
                &task.task_id,
                task.context_id.as_deref(),
                TaskState::Working,
                Some(reply),
                false,
            ))
            .await;
        Ok(())
    }
}

fn card(name: &str) -> AgentInfo {
    AgentInfo {
        name: name.into(),
        description: format!("{name} test agent"),
        url: format!("local://{name}"),
        skills: vec![],
    }
}

fn agent_spec(name: &str, engine: Arc<EchoEngine>) -> ServiceDefinition {
    ServiceDefinition::AgentSpec {
        card: card(name),
        engine,
    }
}

fn final_response(text: &str) -> ConnectResponse {
    ConnectResponse::message(Message::assistant(text))
}

fn agent_call_response(text: &str, requests: Vec<(&str, &str, &str)>) -> ConnectResponse {
    let mut response = ConnectResponse::message(Message::assistant(text));
    for (id, uri, input) in requests {
        response.options.agents.requests.push(AgentRequest {
            id: id.into(),
            uri: uri.into(),
            caller_id: id.into(),
            call: AgentCall::Text(input.into()),
        });
    }
    response
}

fn tool_call_response(text: &str, id: &str, uri: &str) -> ConnectResponse {
    let mut response = ConnectResponse::message(Message::assistant(text));
    response.options.tools.requests.push(ToolRequest {
        id: id.into(),
        uri: uri.into(),
        caller_id: id.into(),
        call: ToolCallSpec {
            name: "noop".into(),
            arguments: serde_json::json!({}),
        },
    });
    response
}

fn agent_response_text(result: &AgentCallResult) -> String {
    match result {
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

// --- Scenarios ---

#[tokio::test]
async fn empty_services_round_trips_one_provider_call() {
    let provider = ScriptedProvider::new(vec![final_response("just chatting")]);
    let orch = Orchestrator::with_config(
        "test-model",
        provider.clone(),
        OrchestratorConfig::default(),
    );

    let text = orch.connect("hi").await.unwrap();
    assert_eq!(text, "just chatting");
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn echo_string_pass_through() {
    let provider = ScriptedProvider::new(vec![
        agent_call_response("calling echo", vec![("r1", "echo", "hello")]),
        final_response("done"),
    ]);
    let orch = Orchestrator::with_config(
        "test-model",
        provider.clone(),
        OrchestratorConfig::default(),
    );
    orch.add_as(Some("echo".into()), agent_spec("echo", EchoEngine::instant()));

    let mut events = orch.subscribe();
    let text = orch.connect("hello").await.unwrap();

    assert_eq!(text, "done");
    assert_eq!(provider.call_count(), 2);

    // The second provider call sees exactly the echo response, correlated by id
    let second = provider.request(1);
    let responses = &second.options.agents.responses;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].id, "r1");
    assert!(agent_response_text(&responses[0].result).contains("Echo: hello"));

    // Exactly one update event carrying the echo agent's response
    let mut updates = 0;
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::Update {
            state: ProgressState::Response(response),
            ..
        } = event
        {
            assert_eq!(response.id(), "r1");
            updates += 1;
        }
    }
    assert_eq!(updates, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatch_respects_the_concurrency_cap() {
    let engine = EchoEngine::with_delay(Duration::from_millis(100));
    let count = 25usize;

    let requests: Vec<(String, String, String)> = (0..count)
        .map(|i| (format!("r{i}"), format!("u{i}"), "work".to_string()))
        .collect();
    let first = agent_call_response(
        "fanning out",
        requests
            .iter()
            .map(|(id, uri, input)| (id.as_str(), uri.as_str(), input.as_str()))
            .collect(),
    );

    let provider = ScriptedProvider::new(vec![first, final_response("done")]);
    let orch = Orchestrator::with_config(
        "test-model",
        provider.clone(),
        OrchestratorConfig::default(),
    );
    for i in 0..count {
        orch.add_as(
            Some(format!("u{i}")),
            agent_spec(&format!("u{i}"), engine.clone()),
        );
    }

    let started = Instant::now();
    let text = orch.connect("go").await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(text, "done");
    assert_eq!(provider.request(1).options.agents.responses.len(), count);
    assert!(
        engine.peak.load(Ordering::SeqCst) <= 10,
        "peak in-flight {} exceeded the concurrency bound",
        engine.peak.load(Ordering::SeqCst)
    );
    assert!(
        elapsed >= Duration::from_millis(290),
        "25 requests under a bound of 10 cannot finish in {elapsed:?}"
    );
}

#[tokio::test]
async fn cancellation_mid_loop_rejects_without_further_provider_calls() {
    // The provider would keep the loop going forever
    let responses: Vec<ConnectResponse> = (0..10)
        .map(|i| agent_call_response("looping", vec![(&format!("r{i}"), "slow", "work")]))
        .collect();
    let provider = ScriptedProvider::new(responses);

    let cancel = CancellationToken::new();
    let orch = Orchestrator::with_config(
        "test-model",
        provider.clone(),
        OrchestratorConfig::default(),
    )
    .with_cancel(cancel.clone());
    orch.add_as(
        Some("slow".into()),
        agent_spec("slow", EchoEngine::with_delay(Duration::from_millis(500))),
    );

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        canceller.cancel();
    });

    let err = orch.connect("start").await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(
        provider.call_count(),
        1,
        "no provider calls may happen after cancellation fired"
    );
}

#[tokio::test]
async fn max_iterations_hint_closes_the_final_turn() {
    let engine = EchoEngine::instant();
    let responses: Vec<ConnectResponse> = (0..3)
        .map(|i| agent_call_response("still working", vec![(&format!("r{i}"), "echo", "more")]))
        .collect();
    let provider = ScriptedProvider::new(responses);
    let orch = Orchestrator::with_config(
        "test-model",
        provider.clone(),
        OrchestratorConfig::default(),
    );
    orch.add_as(Some("echo".into()), agent_spec("echo", engine.clone()));

    let text = orch
        .connect_with(
            "never converges",
            ConnectOptions {
                iterations: Some(3),
                ..ConnectOptions::default()
            },
        )
        .await
        .unwrap();

    // The third response is returned even though it still carried calls
    assert_eq!(text, "still working");
    assert_eq!(provider.call_count(), 3);
    assert_eq!(
        engine.invocations.load(Ordering::SeqCst),
        2,
        "calls from the final iteration must not be dispatched"
    );

    let third = provider.request(2);
    assert_eq!(
        third.messages.last().unwrap().content,
        MAX_ITERATIONS_HINT,
        "the hint must be the final message of the final request"
    );
}

#[tokio::test]
async fn unknown_uri_is_tolerated() {
    let provider = ScriptedProvider::new(vec![
        tool_call_response("ghost hunting", "r1", "ghost"),
        final_response("unreachable"),
    ]);
    let orch = Orchestrator::with_config(
        "test-model",
        provider.clone(),
        OrchestratorConfig::default(),
    );

    // Dispatch finds nothing, so the loop ends with the first response
    let text = orch.connect("find the ghost").await.unwrap();
    assert_eq!(text, "ghost hunting");
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn task_ids_are_sticky_per_parent() {
    let engine = EchoEngine::instant();
    let provider = ScriptedProvider::new(vec![
        agent_call_response(
            "two at once",
            vec![("r1", "a", "first"), ("r2", "a", "second")],
        ),
        agent_call_response("one more", vec![("r3", "a", "third")]),
        final_response("done"),
    ]);
    let orch = Orchestrator::with_config(
        "test-model",
        provider.clone(),
        OrchestratorConfig::default(),
    );
    orch.add_as(Some("a".into()), agent_spec("a", engine.clone()));

    let text = orch
        .connect_with(
            "go",
            ConnectOptions {
                parent_task_id: Some("parent-1".into()),
                ..ConnectOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(text, "done");

    let seen = engine.seen_tasks.lock().unwrap();
    assert_eq!(seen.len(), 3);
    let first_task = seen[0].task_id.clone();
    assert!(
        seen.iter().all(|t| t.task_id == first_task),
        "every call within the parent must reuse one child task"
    );
    assert!(seen
        .iter()
        .all(|t| t.message.reference_task_ids.contains(&first_task)));
    assert_eq!(orch.tasks().get("parent-1", "a"), Some(first_task));
}

#[tokio::test]
async fn agent_card_derives_one_skill_per_service() {
    let provider = ScriptedProvider::new(vec![]);
    let orch = Orchestrator::with_config(
        "test-model",
        provider,
        OrchestratorConfig::default(),
    );
    orch.add_as(Some("echo".into()), agent_spec("echo", EchoEngine::instant()));

    let card = orch.agent_card().await.unwrap();
    assert_eq!(card.name, "test-model-agent");
    assert!(card.description.contains("test-model"));
    assert_eq!(card.skills.len(), 1);
    assert_eq!(card.skills[0].id, "echo");
    assert_eq!(card.skills[0].tags, vec!["agent"]);
}

#[tokio::test]
async fn orchestrator_agent_facade_completes_tasks() {
    let provider = ScriptedProvider::new(vec![final_response("orchestrated answer")]);
    let orch = Orchestrator::with_config(
        "test-model",
        provider.clone(),
        OrchestratorConfig::default(),
    );

    let agent = orch.agent().await.unwrap();
    let info = agent.info().await.unwrap();
    assert_eq!(info.name, "test-model-agent");

    let options = artinet_core::options::ExecutionOptions::new(10);
    let request = AgentRequest {
        id: "r1".into(),
        uri: agent.uri().to_string(),
        caller_id: "c1".into(),
        call: AgentCall::Text("what is the answer?".into()),
    };
    let response = agent.execute(&request, &options).await.unwrap();

    assert!(response.error.is_none());
    match response.result {
        AgentCallResult::Task(task) => {
            assert_eq!(task.status.state, TaskState::Completed);
            assert_eq!(
                task.status.message.as_ref().unwrap().text(),
                "orchestrated answer"
            );
        }
        other => panic!("expected a task result, got {other:?}"),
    }
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn close_stops_all_services() {
    let provider = ScriptedProvider::new(vec![]);
    let orch = Orchestrator::with_config(
        "test-model",
        provider,
        OrchestratorConfig::default(),
    );
    orch.add_as(Some("echo".into()), agent_spec("echo", EchoEngine::instant()));

    orch.close().await;
    // Registry still lists the adapter, but its owned agent is stopped:
    // a fresh dispatch surfaces the stop as an embedded error.
    let options = artinet_core::options::ExecutionOptions::new(10);
    let request = AgentRequest {
        id: "r1".into(),
        uri: "echo".into(),
        caller_id: "c1".into(),
        call: AgentCall::Text("late".into()),
    };
    let responses = orch
        .manager()
        .call(vec![artinet_core::call::CallRequest::Agent(request)], &options)
        .await;
    assert_eq!(responses.len(), 1);
    assert!(responses[0].error().is_some());
}
