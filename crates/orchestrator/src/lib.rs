//! # artinet-orchestrator
//!
//! The reactive loop, the callable registry and dispatcher, the event
//! monitor, and the facade composing them.

pub mod config;
pub mod logging;
pub mod manager;
pub mod monitor;
pub mod normalize;
pub mod orchestrator;
pub mod reactive;

pub use config::OrchestratorConfig;
pub use manager::{Callable, Manager};
pub use monitor::{Context, Monitor};
pub use normalize::{extract_text, ConnectInput};
pub use orchestrator::{ConnectOptions, Orchestrator, ServiceDefinition};
pub use reactive::{run_loop, MAX_ITERATIONS_HINT};
