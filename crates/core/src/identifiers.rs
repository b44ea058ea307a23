//! Newtype domain identifiers.
//!
//! Stage identity is a closed six-member enumeration: there is no way to name
//! a stage that does not exist. Registry entries, tiers, and models are
//! string-backed newtypes so a [`TierName`] can never be passed where a
//! [`ModelId`] is expected.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ErrorKind, InvalidStageId};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or only whitespace.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Wraps a non-empty literal known at compile time.
            #[allow(dead_code)]
            pub(crate) fn from_literal(value: &'static str) -> Self {
                debug_assert!(!value.trim().is_empty());
                Self(value.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| {
                    format!("{} must not be empty", stringify!($name))
                })
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Stage identity
// ---------------------------------------------------------------------------

/// One of the six fixed stages of the cognitive pipeline, ordered from the
/// most abstract (top) to the most concrete (bottom).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Mission, values, ethics: the moral compass of the entity.
    Aspirational,
    /// Long-term strategy against the state of the world.
    GlobalStrategy,
    /// The entity's model of its own capabilities and limitations.
    AgentModel,
    /// Planning, forecasting, directives, and resource allocation.
    ExecutiveFunction,
    /// Task selection and switching, frustration, damping.
    CognitiveControl,
    /// One task at a time; detects success and failure.
    TaskProsecution,
}

impl StageId {
    /// All stages in pipeline order, top to bottom.
    pub const ALL: [StageId; 6] = [
        StageId::Aspirational,
        StageId::GlobalStrategy,
        StageId::AgentModel,
        StageId::ExecutiveFunction,
        StageId::CognitiveControl,
        StageId::TaskProsecution,
    ];

    /// Zero-based position in the pipeline.
    pub fn index(self) -> usize {
        self as usize
    }

    /// One-based layer number (1 = Aspirational, 6 = TaskProsecution).
    pub fn level(self) -> u8 {
        self as u8 + 1
    }

    /// Looks a stage up by its one-based layer number.
    pub fn from_level(level: u8) -> Result<Self, InvalidStageId> {
        level
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(usize::from(i)).copied())
            .ok_or_else(|| InvalidStageId::new(level.to_string()))
    }

    /// The configuration / wire name of the stage (`snake_case`).
    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Aspirational => "aspirational",
            StageId::GlobalStrategy => "global_strategy",
            StageId::AgentModel => "agent_model",
            StageId::ExecutiveFunction => "executive_function",
            StageId::CognitiveControl => "cognitive_control",
            StageId::TaskProsecution => "task_prosecution",
        }
    }

    /// The stage directly above this one, if any.
    pub fn above(self) -> Option<StageId> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// The stage directly below this one, if any.
    pub fn below(self) -> Option<StageId> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// A one-line statement of what the stage is responsible for.
    pub fn charter(self) -> &'static str {
        match self {
            StageId::Aspirational => {
                "You are the aspirational layer: the moral compass and guiding mission of the entity."
            }
            StageId::GlobalStrategy => {
                "You are the global strategy layer: long-term strategic thinking against the state of the world."
            }
            StageId::AgentModel => {
                "You are the agent model layer: the entity's understanding of its own capabilities and limitations."
            }
            StageId::ExecutiveFunction => {
                "You are the executive function layer: planning, forecasting, directives, and resource allocation."
            }
            StageId::CognitiveControl => {
                "You are the cognitive control layer: task selection, task switching, and frustration management."
            }
            StageId::TaskProsecution => {
                "You are the task prosecution layer: carry out one task at a time and detect success or failure."
            }
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = InvalidStageId;

    /// Accepts the `snake_case` name, the CamelCase layer name
    /// (`"AspirationalLayer"`), or the one-based level number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised: String = s
            .trim()
            .trim_end_matches("Layer")
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        if let Ok(level) = normalised.parse::<u8>() {
            return Self::from_level(level).map_err(|_| InvalidStageId::new(s));
        }

        Self::ALL
            .into_iter()
            .find(|id| id.as_str().replace('_', "") == normalised)
            .ok_or_else(|| InvalidStageId::new(s))
    }
}

impl TryFrom<u8> for StageId {
    type Error = InvalidStageId;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(level)
    }
}

impl InvalidStageId {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single envelope travelling through the pipeline.
///
/// Propagated through spans so every hop of one item can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a new random message identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (configuration names)
// ---------------------------------------------------------------------------

string_id! {
    /// Key of an entry in a capability, resource, or product registry.
    ///
    /// Unique per registry; adding a second entry under the same name
    /// replaces the first.
    EntryName
}

string_id! {
    /// Names a backend tier in the gateway configuration (e.g. `"premium"`).
    TierName
}

string_id! {
    /// A backend model identifier as sent on the wire (e.g. `"openai/gpt-4"`).
    ModelId
}
