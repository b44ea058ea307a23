//! Backend configuration.

use std::collections::HashMap;
use std::sync::Arc;

use ace_core::{BackendError, ReasoningBackend};
use serde::{Deserialize, Serialize};

use crate::echo::EchoBackend;
use crate::openrouter::OpenRouterBackend;

/// Which backend implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenRouter or any other OpenAI-compatible chat completions endpoint.
    #[default]
    OpenRouter,
    /// Offline backend that echoes the last message.
    Echo,
}

/// Configuration of the reasoning backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Implementation to build.
    pub kind: BackendKind,

    /// Base URL of the chat completions API; `/chat/completions` is appended.
    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Extra HTTP headers sent with every request (e.g. `HTTP-Referer`).
    pub headers: HashMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::OpenRouter,
            base_url: "https://openrouter.ai/api/v1".into(),
            api_key_env: "OPENROUTER_API_KEY".into(),
            timeout_secs: 30,
            headers: HashMap::new(),
        }
    }
}

impl BackendConfig {
    /// Builds the configured backend.
    ///
    /// # Errors
    ///
    /// [`BackendError::NotConfigured`] if the HTTP client cannot be built.
    /// A missing API key is reported on the first call, not here.
    pub fn build(&self) -> Result<Arc<dyn ReasoningBackend>, BackendError> {
        match self.kind {
            BackendKind::OpenRouter => Ok(Arc::new(OpenRouterBackend::new(self.clone())?)),
            BackendKind::Echo => Ok(Arc::new(EchoBackend::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_openrouter() {
        let config = BackendConfig::default();
        assert_eq!(config.kind, BackendKind::OpenRouter);
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: BackendConfig = serde_json::from_str(r#"{"kind": "echo"}"#).unwrap();
        assert_eq!(config.kind, BackendKind::Echo);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.build().unwrap().name(), "echo");
    }
}
