//! The unit of work carried between stages.

use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;
use crate::identifiers::{MessageId, StageId};
use crate::types::Timestamp;

/// Which way an envelope travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Top to bottom: directives and guidance.
    Downward,
    /// Bottom to top: reports, telemetry, and errors.
    Upward,
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flow::Downward => f.write_str("downward"),
            Flow::Upward => f.write_str("upward"),
        }
    }
}

/// Who produced an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "stage")]
pub enum Origin {
    /// Submitted from outside the pipeline.
    External,
    /// Emitted by a stage.
    Stage(StageId),
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::External => f.write_str("external"),
            Origin::Stage(id) => write!(f, "{id}"),
        }
    }
}

/// A failure report travelling upward in place of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Taxonomy kind of the failure.
    pub kind: ErrorKind,
    /// The stage where the failure happened.
    pub stage: StageId,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.kind, self.message)
    }
}

/// Envelope contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Body {
    /// Opaque stage-defined data.
    Payload(serde_json::Value),
    /// A failure from a stage at or below the sender.
    Error(ErrorReport),
}

/// One item in an inter-stage queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique per envelope.
    pub id: MessageId,
    /// Producer.
    pub origin: Origin,
    /// Contents.
    pub body: Body,
    /// When the envelope was created.
    pub created_at: Timestamp,
}

impl Envelope {
    /// Wraps a payload.
    pub fn payload(origin: Origin, value: impl Into<serde_json::Value>) -> Self {
        Self {
            id: MessageId::new_random(),
            origin,
            body: Body::Payload(value.into()),
            created_at: Timestamp::now(),
        }
    }

    /// Wraps a payload submitted from outside the pipeline.
    pub fn external(value: impl Into<serde_json::Value>) -> Self {
        Self::payload(Origin::External, value)
    }

    /// Builds an error envelope raised by `stage`.
    pub fn error(stage: StageId, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_random(),
            origin: Origin::Stage(stage),
            body: Body::Error(ErrorReport {
                kind,
                stage,
                message: message.into(),
            }),
            created_at: Timestamp::now(),
        }
    }

    /// The payload, if this is not an error envelope.
    pub fn as_payload(&self) -> Option<&serde_json::Value> {
        match &self.body {
            Body::Payload(v) => Some(v),
            Body::Error(_) => None,
        }
    }

    /// The error report, if this is an error envelope.
    pub fn as_error(&self) -> Option<&ErrorReport> {
        match &self.body {
            Body::Error(e) => Some(e),
            Body::Payload(_) => None,
        }
    }

    /// Whether this envelope carries an error report.
    pub fn is_error(&self) -> bool {
        matches!(self.body, Body::Error(_))
    }

    /// Payload rendered as prompt text: strings verbatim, anything else as
    /// compact JSON.
    pub fn text(&self) -> String {
        match &self.body {
            Body::Payload(serde_json::Value::String(s)) => s.clone(),
            Body::Payload(v) => v.to_string(),
            Body::Error(e) => e.to_string(),
        }
    }
}
