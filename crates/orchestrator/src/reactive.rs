//! The reactive loop — drives the LLM ↔ services dialogue.
//!
//! Each iteration round-trips the evolving request through the provider,
//! fans the returned calls out through the manager, folds the responses back
//! into the request, and goes again. The loop stops when the model emits no
//! calls, when the iteration budget runs out, or when cancellation fires.

use tracing::{debug, warn};

use artinet_core::call::{CallRequest, CallResponse};
use artinet_core::connect::{ConnectRequest, ConnectResponse};
use artinet_core::error::Error;
use artinet_core::message::Message;
use artinet_core::options::ExecutionOptions;
use artinet_core::provider::Provider;

use crate::manager::Manager;

/// The system message injected at the start of the final allowed iteration.
pub const MAX_ITERATIONS_HINT: &str = "You have reached the maximum number of iterations for this task. Do not attempt any further tool or agent calls. Summarize the progress made so far, provide your best final answer, and suggest next steps if work remains.";

/// Fold dispatch results back into the request so the next provider call
/// sees them, and append any extra messages.
fn merge(request: &mut ConnectRequest, results: Vec<CallResponse>, extra: Vec<Message>) {
    for response in results {
        match response {
            CallResponse::Tool(r) => request.options.tools.responses.push(r),
            CallResponse::Agent(r) => request.options.agents.responses.push(r),
        }
    }
    request.messages.extend(extra);
}

/// Run the loop to completion.
///
/// The iteration budget comes from the options. On the final allowed
/// iteration the max-iterations hint is injected before the provider call,
/// and that call's response is final regardless of whether it still carries
/// calls — they are not dispatched.
pub async fn run_loop(
    mut request: ConnectRequest,
    provider: &dyn Provider,
    manager: &Manager,
    options: &ExecutionOptions,
) -> Result<ConnectResponse, Error> {
    let mut iterations_left = options.iterations;
    let mut response: Option<ConnectResponse> = None;
    let mut results: Vec<CallResponse> = Vec::new();

    loop {
        if iterations_left == 0 || options.cancel.is_cancelled() {
            break;
        }
        let last_iteration = iterations_left == 1;
        let extra = if last_iteration {
            vec![Message::system(MAX_ITERATIONS_HINT)]
        } else {
            Vec::new()
        };
        merge(&mut request, std::mem::take(&mut results), extra);

        debug!(
            iterations_left,
            last_iteration,
            messages = request.messages.len(),
            "Calling provider"
        );

        let current = match provider.connect(request.clone(), &options.cancel).await {
            Ok(r) => r,
            Err(e) if options.cancel.is_cancelled() => {
                debug!(error = %e, "Provider call cancelled");
                return Err(Error::Cancelled);
            }
            Err(e) => return Err(Error::Provider(e)),
        };

        let calls: Vec<CallRequest> = current
            .options
            .tools
            .requests
            .iter()
            .cloned()
            .map(CallRequest::Tool)
            .chain(
                current
                    .options
                    .agents
                    .requests
                    .iter()
                    .cloned()
                    .map(CallRequest::Agent),
            )
            .collect();
        response = Some(current);

        if last_iteration {
            if !calls.is_empty() {
                warn!(
                    dropped = calls.len(),
                    "Model emitted calls on the final iteration; not dispatching"
                );
            }
            break;
        }

        results = manager.call(calls, options).await;
        if results.is_empty() {
            break;
        }

        for result in &results {
            options.emit(result.clone());
        }
        iterations_left -= 1;
    }

    if options.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    response.ok_or(Error::NoResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    use artinet_core::call::{AgentCall, AgentRequest};
    use artinet_core::connect::ConnectResponse;
    use artinet_core::error::ProviderError;

    /// Provider driven by a script of canned responses; records every
    /// request it receives.
    struct ScriptedProvider {
        script: Mutex<Vec<ConnectResponse>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<ConnectRequest>>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<ConnectResponse>) -> Self {
            responses.reverse();
            Self {
                script: Mutex::new(responses),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
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
            _cancel: &CancellationToken,
        ) -> Result<ConnectResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ProviderError::Malformed("script exhausted".into()))
        }
    }

    fn final_response(text: &str) -> ConnectResponse {
        ConnectResponse::message(Message::assistant(text))
    }

    fn response_with_agent_request(text: &str, id: &str, uri: &str) -> ConnectResponse {
        let mut response = ConnectResponse::message(Message::assistant(text));
        response.options.agents.requests.push(AgentRequest {
            id: id.into(),
            uri: uri.into(),
            caller_id: id.into(),
            call: AgentCall::Text("go".into()),
        });
        response
    }

    fn request() -> ConnectRequest {
        ConnectRequest::new("test-model", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn final_turn_on_first_empty_response() {
        let provider = ScriptedProvider::new(vec![final_response("done")]);
        let manager = Manager::new(10);
        let options = ExecutionOptions::new(10);

        let response = run_loop(request(), &provider, &manager, &options)
            .await
            .unwrap();
        assert_eq!(response.message.content, "done");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_uris_terminate_after_one_call() {
        let provider = ScriptedProvider::new(vec![
            response_with_agent_request("calling", "r1", "ghost"),
            final_response("unreachable"),
        ]);
        let manager = Manager::new(10);
        let options = ExecutionOptions::new(10);

        let response = run_loop(request(), &provider, &manager, &options)
            .await
            .unwrap();
        // Dispatch produced nothing, so the loop exits with the first response
        assert_eq!(response.message.content, "calling");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn zero_budget_is_no_response() {
        let provider = ScriptedProvider::new(vec![final_response("never")]);
        let manager = Manager::new(10);
        let mut options = ExecutionOptions::new(10);
        options.iterations = 0;

        let err = run_loop(request(), &provider, &manager, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoResponse));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn hint_is_final_message_on_last_iteration() {
        // Budget 1: the very first call is the last allowed iteration
        let provider = ScriptedProvider::new(vec![response_with_agent_request(
            "still going",
            "r1",
            "ghost",
        )]);
        let manager = Manager::new(10);
        let mut options = ExecutionOptions::new(10);
        options.iterations = 1;

        let response = run_loop(request(), &provider, &manager, &options)
            .await
            .unwrap();
        // The response is final even though it carried calls
        assert_eq!(response.message.content, "still going");
        assert_eq!(provider.call_count(), 1);

        let seen = provider.requests.lock().unwrap();
        let last_message = seen[0].messages.last().unwrap();
        assert_eq!(last_message.content, MAX_ITERATIONS_HINT);
    }

    #[tokio::test]
    async fn cancellation_before_first_call_rejects() {
        let provider = ScriptedProvider::new(vec![final_response("never")]);
        let manager = Manager::new(10);
        let options = ExecutionOptions::new(10);
        options.cancel.cancel();

        let err = run_loop(request(), &provider, &manager, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let provider = ScriptedProvider::new(vec![]);
        let manager = Manager::new(10);
        let options = ExecutionOptions::new(10);

        let err = run_loop(request(), &provider, &manager, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }
}
