//! Reasoning backend infrastructure adapter.
//!
//! Implements [`ace_core::ReasoningBackend`] over the OpenAI-compatible chat
//! completions API (OpenRouter by default), plus an offline [`EchoBackend`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, and response
//! parsing live here. The stages crate sees only
//! [`ace_core::ReasoningBackend`].

pub mod config;
pub mod echo;
pub mod openrouter;

pub use config::{BackendConfig, BackendKind};
pub use echo::EchoBackend;
pub use openrouter::OpenRouterBackend;
