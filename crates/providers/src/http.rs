//! Direct HTTP provider.
//!
//! POSTs the JSON-serialised [`ConnectRequest`] to the configured endpoint
//! and decodes the [`ConnectResponse`], accepting either the bare response
//! or a `body`-enveloped one. Non-2xx responses fail with a structured error
//! carrying status, status text, and body.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use artinet_core::connect::{ConnectRequest, ConnectResponse, ResponseOptions};
use artinet_core::error::ProviderError;
use artinet_core::message::{Message, Role};
use artinet_core::provider::Provider;

/// Environment variable selecting the default endpoint.
pub const API_URL_ENV: &str = "ARTINET_API_URL";

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A provider speaking the native connect contract over HTTP.
#[derive(Debug)]
pub struct HttpProvider {
    url: String,
    client: reqwest::Client,
}

/// Wire shape tolerating a `content` that is either a string or an object
/// carrying a `text` field.
#[derive(Debug, Deserialize)]
struct WireMessage {
    role: Role,
    content: Value,
}

impl WireMessage {
    fn into_message(self) -> Result<Message, ProviderError> {
        let content = match self.content {
            Value::String(text) => text,
            Value::Object(ref object) => match object.get("text").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => {
                    return Err(ProviderError::Malformed(
                        "message content object has no text field".into(),
                    ))
                }
            },
            Value::Null => String::new(),
            other => {
                return Err(ProviderError::Malformed(format!(
                    "unsupported message content shape: {other}"
                )))
            }
        };
        Ok(Message {
            role: self.role,
            content,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    timestamp: DateTime<Utc>,
    message: WireMessage,
    #[serde(default)]
    options: ResponseOptions,
}

impl WireResponse {
    fn into_response(self) -> Result<ConnectResponse, ProviderError> {
        Ok(ConnectResponse {
            timestamp: self.timestamp,
            message: self.message.into_message()?,
            options: self.options,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    body: WireResponse,
}

impl HttpProvider {
    /// Create a provider targeting an explicit endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            url: url.into(),
            client,
        }
    }

    /// Create a provider targeting the endpoint from `ARTINET_API_URL`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let url = std::env::var(API_URL_ENV)
            .map_err(|_| ProviderError::NotConfigured(format!("{API_URL_ENV} is not set")))?;
        Ok(Self::new(url))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn decode(body: &str) -> Result<ConnectResponse, ProviderError> {
        if let Ok(wire) = serde_json::from_str::<WireResponse>(body) {
            return wire.into_response();
        }
        match serde_json::from_str::<WireEnvelope>(body) {
            Ok(envelope) => envelope.body.into_response(),
            Err(e) => Err(ProviderError::Malformed(e.to_string())),
        }
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        "artinet-http"
    }

    async fn connect(
        &self,
        request: ConnectRequest,
        cancel: &CancellationToken,
    ) -> Result<ConnectResponse, ProviderError> {
        let url = request
            .options
            .endpoint
            .clone()
            .unwrap_or_else(|| self.url.clone());

        debug!(url = %url, model = %request.model, "Sending connect request");

        let send = self.client.post(&url).json(&request).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = send => result.map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        let status = response.status();
        let status_text = status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string();

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            text = response.text() => text.map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        if !status.is_success() {
            warn!(status = status.as_u16(), body = %body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                status_text,
                body,
            });
        }

        Self::decode(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bare_response() {
        let body = r#"{
            "timestamp": "2024-05-01T12:00:00Z",
            "message": {"role": "assistant", "content": "hello"},
            "options": {}
        }"#;
        let response = HttpProvider::decode(body).unwrap();
        assert_eq!(response.message.content, "hello");
        assert!(!response.options.has_requests());
    }

    #[test]
    fn decodes_enveloped_response() {
        let body = r#"{
            "body": {
                "timestamp": "2024-05-01T12:00:00Z",
                "message": {"role": "assistant", "content": "wrapped"}
            }
        }"#;
        let response = HttpProvider::decode(body).unwrap();
        assert_eq!(response.message.content, "wrapped");
    }

    #[test]
    fn decodes_object_content_with_text_field() {
        let body = r#"{
            "timestamp": "2024-05-01T12:00:00Z",
            "message": {"role": "assistant", "content": {"text": "nested"}}
        }"#;
        let response = HttpProvider::decode(body).unwrap();
        assert_eq!(response.message.content, "nested");
    }

    #[test]
    fn null_content_becomes_empty_message() {
        let body = r#"{
            "timestamp": "2024-05-01T12:00:00Z",
            "message": {"role": "assistant", "content": null}
        }"#;
        let response = HttpProvider::decode(body).unwrap();
        assert!(response.message.content.is_empty());
    }

    #[test]
    fn garbage_is_malformed() {
        let err = HttpProvider::decode("definitely not json").unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn from_env_requires_the_variable() {
        // Run both cases in one test so parallel tests never race on the
        // process environment.
        std::env::remove_var(API_URL_ENV);
        assert!(matches!(
            HttpProvider::from_env().unwrap_err(),
            ProviderError::NotConfigured(_)
        ));

        std::env::set_var(API_URL_ENV, "https://api.example.test/connect");
        let provider = HttpProvider::from_env().unwrap();
        assert_eq!(provider.url(), "https://api.example.test/connect");
        std::env::remove_var(API_URL_ENV);
    }

    #[test]
    fn response_with_requests_decodes() {
        let body = r#"{
            "timestamp": "2024-05-01T12:00:00Z",
            "message": {"role": "assistant", "content": "calling"},
            "options": {
                "tools": {"requests": [{
                    "id": "r1", "uri": "calc", "callerId": "c1",
                    "call": {"name": "add", "arguments": {"a": 1}}
                }]},
                "agents": {"requests": [{
                    "id": "r2", "uri": "echo", "callerId": "c2",
                    "call": "hello"
                }]}
            }
        }"#;
        let response = HttpProvider::decode(body).unwrap();
        assert_eq!(response.options.tools.requests.len(), 1);
        assert_eq!(response.options.agents.requests.len(), 1);
        assert!(response.options.has_requests());
    }
}
