//! Offline backend for dry runs.

use ace_core::{BackendError, CompletionRequest, ReasoningBackend};
use async_trait::async_trait;

/// Replies with the last message of the request, truncated to roughly
/// `max_tokens`. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBackend;

impl EchoBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReasoningBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let reply = format!("[{}] {last}", request.model);
        let limit = request
            .max_tokens
            .map(|t| usize::try_from(t).unwrap_or(usize::MAX).saturating_mul(4));
        Ok(match limit {
            Some(chars) => reply.chars().take(chars).collect(),
            None => reply,
        })
    }
}
