//! Stage behaviours: what a stage does with one envelope.
//!
//! The stage loop owns scheduling, error capture, and queue I/O. A behaviour
//! only maps an incoming payload to zero or more outgoing payloads.

use std::sync::Arc;

use ace_core::{
    ChatMessage, ConfigValue, Envelope, ErrorKind, Flow, Ledger, RegistryError, StageId,
    StageProfile,
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::gateway::{GatewayError, ReasoningGateway, Reply};

/// Errors a behaviour may return. Each becomes an error envelope sent up.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    /// A reasoning call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The behaviour needs a reasoning gateway but none is attached.
    #[error("Stage {0} has no reasoning gateway attached")]
    NoGateway(StageId),

    /// Behaviour-specific failure.
    #[error("{0}")]
    Behavior(String),

    /// The behaviour panicked.
    #[error("Stage behaviour panicked: {0}")]
    Panicked(String),
}

impl StageError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Gateway(e) => e.kind(),
            StageError::Registry(e) => e.kind(),
            StageError::NoGateway(_) | StageError::Behavior(_) | StageError::Panicked(_) => {
                ErrorKind::Stage
            }
        }
    }
}

/// One output of a behaviour.
#[derive(Debug, Clone, PartialEq)]
pub enum Emit {
    /// Send to the stage above.
    Up(serde_json::Value),
    /// Send to the stage below.
    Down(serde_json::Value),
}

impl Emit {
    /// An emission continuing in `flow`'s direction.
    pub fn along(flow: Flow, value: impl Into<serde_json::Value>) -> Self {
        match flow {
            Flow::Downward => Emit::Down(value.into()),
            Flow::Upward => Emit::Up(value.into()),
        }
    }
}

/// What a behaviour can see while processing one envelope.
///
/// A snapshot taken when processing starts; amendments made concurrently
/// apply from the next envelope.
#[derive(Clone)]
pub struct StageContext {
    /// The stage doing the processing.
    pub stage: StageId,
    /// The stage's profile.
    pub profile: StageProfile,
    /// Prompt fragments of the stage's registered capabilities, sorted by
    /// capability name.
    pub capability_prompts: Vec<String>,
    /// The stage's own ledger.
    pub ledger: Arc<dyn Ledger>,
    /// The shared gateway, if one is attached.
    pub gateway: Option<Arc<ReasoningGateway>>,
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("stage", &self.stage)
            .field("profile", &self.profile)
            .field("capability_prompts", &self.capability_prompts)
            .field("balance", &self.ledger.balance())
            .field("gateway", &self.gateway.is_some())
            .finish()
    }
}

impl StageContext {
    /// Runs a metered reasoning call against this stage's ledger.
    ///
    /// # Errors
    ///
    /// [`StageError::NoGateway`] if no gateway is attached, otherwise any
    /// [`GatewayError`].
    pub async fn reason(&self, messages: &[ChatMessage]) -> Result<Reply, StageError> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or(StageError::NoGateway(self.stage))?;
        Ok(gateway.generate(messages, self.ledger.as_ref()).await?)
    }

    /// The system prompt: charter, non-empty profile fields, and capability
    /// prompts.
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::from(self.stage.charter());

        let fields: Vec<String> = self
            .profile
            .values()
            .into_iter()
            .filter(|(_, value)| !is_blank(value))
            .map(|(name, value)| format!("- {name}: {value}"))
            .collect();
        if !fields.is_empty() {
            prompt.push_str("\n\nCurrent configuration:\n");
            prompt.push_str(&fields.join("\n"));
        }

        if !self.capability_prompts.is_empty() {
            prompt.push_str("\n\nCapabilities:\n");
            prompt.push_str(&self.capability_prompts.join("\n"));
        }
        prompt
    }
}

fn is_blank(value: &ConfigValue) -> bool {
    match value {
        ConfigValue::Text(s) => s.trim().is_empty(),
        ConfigValue::List(items) => items.is_empty(),
        ConfigValue::Number(_) => false,
    }
}

/// Per-stage payload logic.
#[async_trait]
pub trait StageBehavior: Send + Sync {
    /// Maps one payload envelope travelling in `flow` to its outputs.
    ///
    /// Error envelopes never reach a behaviour; the stage relays them.
    ///
    /// # Errors
    ///
    /// Any [`StageError`]; the stage reports it upward and carries on.
    async fn process(
        &self,
        ctx: &StageContext,
        envelope: Envelope,
        flow: Flow,
    ) -> Result<Vec<Emit>, StageError>;
}

/// Passes every payload on unchanged in its direction of travel.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayBehavior;

#[async_trait]
impl StageBehavior for RelayBehavior {
    async fn process(
        &self,
        _ctx: &StageContext,
        envelope: Envelope,
        flow: Flow,
    ) -> Result<Vec<Emit>, StageError> {
        Ok(envelope
            .as_payload()
            .cloned()
            .map(|value| Emit::along(flow, value))
            .into_iter()
            .collect())
    }
}

/// Asks the reasoning backend to respond to each payload in the stage's
/// role, and forwards the reply in the payload's direction of travel.
///
/// Without a gateway attached it behaves like [`RelayBehavior`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliberativeBehavior;

#[async_trait]
impl StageBehavior for DeliberativeBehavior {
    async fn process(
        &self,
        ctx: &StageContext,
        envelope: Envelope,
        flow: Flow,
    ) -> Result<Vec<Emit>, StageError> {
        if ctx.gateway.is_none() {
            return RelayBehavior.process(ctx, envelope, flow).await;
        }

        let origin = envelope.origin.to_string();
        let messages = vec![
            ChatMessage::system(ctx.system_prompt()),
            ChatMessage::user(format!(
                "Message travelling {flow} from {origin}:\n{}",
                envelope.text()
            )),
        ];
        let reply = ctx.reason(&messages).await?;
        debug!(cost = %reply.total, remaining = %reply.remaining, "Deliberation complete");
        Ok(vec![Emit::along(flow, reply.text)])
    }
}
