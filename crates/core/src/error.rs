//! Error types for the artinet domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all artinet operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Agent adapter errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Tool adapter errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Loop / facade errors ---
    #[error("Operation cancelled")]
    Cancelled,

    #[error("No response from model")]
    NoResponse,

    #[error("No content found in response")]
    NoContent,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {status} {status_text} — {body}")]
    ApiError {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider call cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Request uri '{got}' does not match agent uri '{expected}'")]
    UriMismatch { expected: String, got: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Agent card unavailable: {0}")]
    InfoUnavailable(String),

    #[error("Agent stopped")]
    Stopped,

    #[error("Agent call cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Request uri '{got}' does not match tool uri '{expected}'")]
    UriMismatch { expected: String, got: String },

    #[error("Failed to spawn server process: {0}")]
    Spawn(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Server does not declare the '{0}' capability")]
    MissingCapability(String),

    #[error("Server '{0}' declared tools but listed none")]
    EmptyToolList(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transport closed")]
    Closed,

    #[error("Tool call cancelled")]
    Cancelled,
}
