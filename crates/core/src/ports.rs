//! Port traits implemented by infrastructure crates.
//!
//! The reasoning backend is the only external collaborator the core calls.
//! Its wire format is owned by the implementing crate (`ace-llm`); the core
//! sees a model identifier, an ordered message list, and a text reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ErrorKind;
use crate::identifiers::ModelId;
use crate::types::ChatMessage;

/// Failure of an external reasoning call.
///
/// Propagated unchanged by the gateway; never retried by the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request could not be delivered (connection, TLS, timeout).
    #[error("Backend request failed: {0}")]
    Network(String),

    /// The backend answered with a non-success HTTP status.
    #[error("Backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text, for diagnostics.
        body: String,
    },

    /// The backend answered but the reply could not be interpreted.
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// The backend is missing required configuration (e.g. an API key).
    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// The taxonomy kind of this error. Always [`ErrorKind::Backend`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Backend
    }
}

/// One request to the reasoning backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to run.
    pub model: ModelId,
    /// Ordered, role-tagged conversation.
    pub messages: Vec<ChatMessage>,
    /// Upper bound on reply length, if the caller wants one enforced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// An external text-completion endpoint.
///
/// `complete` is the only suspending step of a reasoning call. Implementations
/// own their timeouts; the core defines none.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Short name for logs (e.g. `"openrouter"`).
    fn name(&self) -> &str;

    /// Runs one completion and returns the reply text.
    ///
    /// # Errors
    ///
    /// [`BackendError`] on network failure, non-success status, or a reply
    /// that cannot be parsed.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}
