//! # artinet-tools
//!
//! MCP stdio tool adapter: subprocess lifecycle, capability discovery with
//! cursor pagination, tool invocation, stderr streaming, and safe shutdown.

pub mod adapter;
pub mod client;
pub mod transport;

pub use adapter::ToolAdapter;
pub use client::McpClient;
pub use transport::{expand_args, StdioTransport};
