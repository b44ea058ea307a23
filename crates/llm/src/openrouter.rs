//! OpenAI-compatible chat completions backend.
//!
//! Defaults to OpenRouter, but any endpoint that accepts the OpenAI request
//! format works by changing `base_url`. No retries: a failed call is returned
//! to the gateway as a [`BackendError`].

use std::time::Duration;

use ace_core::{BackendError, ChatMessage, CompletionRequest, ReasoningBackend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BackendConfig;

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: &message.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

/// A [`ReasoningBackend`] speaking the OpenAI chat completions protocol.
pub struct OpenRouterBackend {
    config: BackendConfig,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl std::fmt::Debug for OpenRouterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterBackend")
            .field("base_url", &self.config.base_url)
            .field("api_key_env", &self.config.api_key_env)
            .field("explicit_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenRouterBackend {
    /// Creates a backend that reads its API key from `config.api_key_env`
    /// at request time.
    ///
    /// # Errors
    ///
    /// [`BackendError::NotConfigured`] if the HTTP client cannot be built.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self {
            config,
            http,
            api_key: None,
        })
    }

    /// Creates a backend with an explicit API key, bypassing the environment.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_api_key(config: BackendConfig, api_key: impl Into<String>) -> Result<Self, BackendError> {
        let mut backend = Self::new(config)?;
        backend.api_key = Some(api_key.into());
        Ok(backend)
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn resolve_api_key(&self) -> Result<String, BackendError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                BackendError::NotConfigured(format!("set the {} environment variable", self.config.api_key_env))
            })
    }
}

#[async_trait]
impl ReasoningBackend for OpenRouterBackend {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let api_key = self.resolve_api_key()?;
        let url = self.completions_url();
        let body = WireRequest {
            model: request.model.as_str(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            max_tokens = ?request.max_tokens,
            "Sending chat completion request"
        );

        let mut req = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json");
        for (k, v) in &self.config.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Chat completion request rejected");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let parsed: WireResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::MalformedResponse(format!("failed to parse response: {e}")))?;

        // Some providers report failures inside a 200 response.
        if let Some(err) = parsed.error {
            return Err(BackendError::Status {
                status: err.code.unwrap_or(status.as_u16()),
                body: err.message,
            });
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::MalformedResponse("response has no choices".into()))?
            .message
            .content
            .ok_or_else(|| BackendError::MalformedResponse("first choice has no content".into()))?;

        debug!(chars = content.chars().count(), "Chat completion received");
        Ok(content)
    }
}
