//! # artinet-core
//!
//! Domain types, traits, and error definitions for the artinet orchestration
//! runtime. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod a2a;
pub mod call;
pub mod connect;
pub mod error;
pub mod event;
pub mod mcp;
pub mod message;
pub mod options;
pub mod provider;
pub mod service;

// Re-export key types at crate root for ergonomics
pub use a2a::{
    A2aClient, A2aMessage, A2aRole, A2aTask, AgentEngine, EngineSink, EngineTask, Part,
    SendMessageParams, SendMessageResult, TaskState, TaskStatus, TaskStatusUpdate,
};
pub use call::{
    AgentCall, AgentCallResult, AgentRequest, AgentResponse, CallRequest, CallResponse,
    ToolCallSpec, ToolRequest, ToolResponse,
};
pub use connect::{ConnectRequest, ConnectResponse, RequestOptions, ResponseOptions};
pub use error::{AgentError, Error, ProviderError, Result, ToolError};
pub use event::{ExecutionEvent, ProgressState};
pub use mcp::{CallToolResult, Implementation, ServerCapabilities, ToolContent, ToolDescriptor};
pub use message::{sanitize, Message, Role, Session};
pub use options::{ExecutionOptions, ResponseCallback, SessionTasks};
pub use provider::Provider;
pub use service::{AgentInfo, AgentService, AgentSkill, ToolInfo, ToolService};
