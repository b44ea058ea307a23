//! Error taxonomy shared by every crate in the workspace.
//!
//! Each component defines its own error type next to the component
//! ([`crate::ledger::LedgerError`], [`crate::pricing::PricingError`],
//! [`crate::ports::BackendError`], [`crate::registry::RegistryError`]). Every
//! one of them maps onto an [`ErrorKind`], which is what travels upward inside
//! error-tagged envelopes and what observability keys on.
//!
//! No error in this workspace is retried automatically. Retry policy, where
//! wanted, belongs to the per-stage behaviour.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifiers::StageId;

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// The coarse classification every error in the system maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected locally: negative debit, unknown amendment key, unknown stage,
    /// unknown tier. Never retried.
    InvalidArgument,

    /// The ledger cannot cover the estimated or actual cost of a call.
    InsufficientFunds,

    /// The external reasoning backend failed (network, status, malformed reply).
    Backend,

    /// The post-call cost exceeded what the pre-call sufficiency check
    /// reserved; token counting and pricing disagree between estimate and
    /// actual.
    BillingInvariantViolation,

    /// A stage behaviour failed for a reason outside the other kinds
    /// (including a caught panic).
    Stage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::Backend => "backend",
            ErrorKind::BillingInvariantViolation => "billing_invariant_violation",
            ErrorKind::Stage => "stage",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Identifier errors
// ---------------------------------------------------------------------------

/// A string or number did not name one of the six stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown stage '{value}': expected a level 1-6 or one of aspirational, global_strategy, agent_model, executive_function, cognitive_control, task_prosecution")]
pub struct InvalidStageId {
    value: String,
}

impl InvalidStageId {
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The rejected input.
    pub fn value(&self) -> &str {
        &self.value
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors raised while validating configuration or applying an amendment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// An amendment named a field that the stage's profile does not declare.
    ///
    /// Amendments never grow the schema.
    #[error("'{field}' is not an amendable field of the {stage} stage")]
    UnknownField {
        /// The stage being amended.
        stage: StageId,
        /// The offending key.
        field: String,
    },

    /// An amendment supplied a value of the wrong shape for a declared field.
    #[error("Field '{field}' of the {stage} stage expects {expected}")]
    TypeMismatch {
        /// The stage being amended.
        stage: StageId,
        /// The field whose value was rejected.
        field: String,
        /// Human-readable description of the accepted shape.
        expected: &'static str,
    },

    /// Static configuration is invalid (produced at load time).
    #[error("Configuration error: {message}")]
    Invalid {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ConfigError {
    /// Creates a [`ConfigError::Invalid`] from a message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// The taxonomy kind of this error. Always [`ErrorKind::InvalidArgument`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}
