//! # artinet-agents
//!
//! A2A agent adapter: message construction, per-parent child-task
//! correlation, lazy single-flight card loading, and in-process agents
//! driven by push-sink engines.

pub mod adapter;
pub mod local;

pub use adapter::AgentAdapter;
pub use local::{status_update, LocalAgent};
