//! Input and output normalization for `connect`.
//!
//! Callers hand over anything from a bare string to a full request; the
//! facade turns it into one canonical [`ConnectRequest`]. On the way out,
//! the final assistant text is extracted from the response.

use artinet_core::connect::{ConnectRequest, ConnectResponse, RequestOptions};
use artinet_core::error::{Error, Result};
use artinet_core::message::{sanitize, Message, Session};

/// The accepted input shapes for `connect`.
#[derive(Debug, Clone)]
pub enum ConnectInput {
    /// A bare string becomes a single user message
    Text(String),
    /// A single message becomes a one-message session
    Message(Message),
    /// A session is used verbatim (empty messages dropped)
    Session(Session),
    /// A full request is used verbatim; caller options are overlaid
    Request(ConnectRequest),
}

impl From<&str> for ConnectInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ConnectInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Message> for ConnectInput {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<Session> for ConnectInput {
    fn from(session: Session) -> Self {
        Self::Session(session)
    }
}

impl From<ConnectRequest> for ConnectInput {
    fn from(request: ConnectRequest) -> Self {
        Self::Request(request)
    }
}

impl ConnectInput {
    /// Build the canonical request for the given model, overlaying the
    /// supplied options.
    pub fn into_request(self, model: &str, options: RequestOptions) -> Result<ConnectRequest> {
        let request = match self {
            Self::Text(text) => {
                if text.is_empty() {
                    return Err(Error::InvalidInput("empty input text".into()));
                }
                let mut request = ConnectRequest::new(model, vec![Message::user(text)]);
                request.options = options;
                request
            }
            Self::Message(message) => {
                let mut request = ConnectRequest::new(model, sanitize([message]));
                request.options = options;
                request
            }
            Self::Session(session) => {
                let mut request = ConnectRequest::new(model, sanitize(session));
                request.options = options;
                request
            }
            Self::Request(mut request) => {
                request.model = model.to_string();
                request.messages = sanitize(request.messages);
                request.options = options;
                request
            }
        };
        Ok(request)
    }
}

/// Extract the final assistant text from a response.
pub fn extract_text(response: &ConnectResponse) -> Result<String> {
    if response.message.content.is_empty() {
        return Err(Error::NoContent);
    }
    Ok(response.message.content.clone())
}
