//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider turns a [`ConnectRequest`] into a [`ConnectResponse`] that may
//! carry service calls. It is a strategy: the reactive loop never inspects
//! the transport. Implementations must honour the cancellation token by
//! aborting in-flight I/O, and must return a well-formed response even on a
//! refusal (an empty assistant message is allowed).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::connect::{ConnectRequest, ConnectResponse};
use crate::error::ProviderError;

/// The core Provider trait.
///
/// The reactive loop may call this many times with an evolving request
/// during one `connect()`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and get the model's response.
    async fn connect(
        &self,
        request: ConnectRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<ConnectResponse, ProviderError>;
}
