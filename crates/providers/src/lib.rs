//! # artinet-providers
//!
//! Reference Provider implementations: the direct HTTP provider speaking the
//! native connect contract, and an adapter bridging an OpenAI-shaped
//! chat-completion API.

pub mod http;
pub mod openai;

pub use http::HttpProvider;
pub use openai::OpenAiProvider;
