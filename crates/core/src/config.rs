//! Static configuration for stages, the pipeline, and the reasoning gateway.
//!
//! Every stage kind declares its own profile struct. The set of amendable
//! fields is exactly the set of struct fields, fixed at compile time by the
//! [`stage_profile!`] macro. An amendment is checked against that list and
//! applied all-or-nothing.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::identifiers::{EntryName, ModelId, StageId, TierName};
use crate::pricing::{HeuristicTokenCounter, PriceTable, TierPolicy, TierPrice, TierSpec};
use crate::types::{Money, UnitPrice};

// ---------------------------------------------------------------------------
// Values and amendments
// ---------------------------------------------------------------------------

/// A configuration value: text, a number, or a list of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// A number (integers are widened).
    Number(f64),
    /// A text value.
    Text(String),
    /// A list of text values.
    List(Vec<String>),
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Number(n) => write!(f, "{n}"),
            ConfigValue::Text(s) => f.write_str(s),
            ConfigValue::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Text(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Number(value)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(value: Vec<String>) -> Self {
        ConfigValue::List(value)
    }
}

/// A set of field → new value assignments for one stage.
pub type Amendment = BTreeMap<String, ConfigValue>;

/// Conversion between a profile field type and [`ConfigValue`].
pub trait FieldValue: Sized {
    /// Description of the accepted shape, used in type-mismatch errors.
    const EXPECTED: &'static str;

    /// Converts from a config value, or `None` if the shape is wrong.
    fn from_value(value: &ConfigValue) -> Option<Self>;

    /// Converts into a config value.
    fn to_value(&self) -> ConfigValue;
}

impl FieldValue for String {
    const EXPECTED: &'static str = "text";

    fn from_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn to_value(&self) -> ConfigValue {
        ConfigValue::Text(self.clone())
    }
}

impl FieldValue for Vec<String> {
    const EXPECTED: &'static str = "a list of text";

    fn from_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::List(items) => Some(items.clone()),
            _ => None,
        }
    }

    fn to_value(&self) -> ConfigValue {
        ConfigValue::List(self.clone())
    }
}

impl FieldValue for f64 {
    const EXPECTED: &'static str = "a finite number";

    fn from_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    fn to_value(&self) -> ConfigValue {
        ConfigValue::Number(*self)
    }
}

// ---------------------------------------------------------------------------
// Macro for per-stage profile structs.
// Generates: struct (serde, all fields defaulted), FIELDS allow-list,
// set_field() checked against the allow-list, values().
// ---------------------------------------------------------------------------
macro_rules! stage_profile {
    (
        $(#[$attr:meta])*
        $name:ident for $stage:path {
            $(
                $(#[$fattr:meta])*
                $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $(
                $(#[$fattr])*
                pub $field: $ty,
            )*
        }

        impl $name {
            /// The stage this profile belongs to.
            pub const STAGE: StageId = $stage;

            /// The amendable fields, in declaration order.
            pub const FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];

            fn set_field(&mut self, field: &str, value: &ConfigValue) -> Result<(), ConfigError> {
                $(
                    if field == stringify!($field) {
                        self.$field = <$ty as FieldValue>::from_value(value).ok_or_else(|| {
                            ConfigError::TypeMismatch {
                                stage: Self::STAGE,
                                field: field.to_string(),
                                expected: <$ty as FieldValue>::EXPECTED,
                            }
                        })?;
                        return Ok(());
                    }
                )*
                Err(ConfigError::UnknownField {
                    stage: Self::STAGE,
                    field: field.to_string(),
                })
            }

            fn values(&self) -> Vec<(&'static str, ConfigValue)> {
                vec![$((stringify!($field), FieldValue::to_value(&self.$field))),*]
            }
        }
    };
}

stage_profile! {
    /// Mission and values: the entity's moral compass.
    AspirationalProfile for StageId::Aspirational {
        /// The mission statement every lower stage serves.
        mission: String,
        /// Values every decision is checked against.
        values: Vec<String>,
    }
}

stage_profile! {
    /// Long-term strategy and goals.
    GlobalStrategyProfile for StageId::GlobalStrategy {
        /// Current strategy.
        strategy: String,
        /// Long-term goals.
        goals: Vec<String>,
    }
}

stage_profile! {
    /// The entity's beliefs about itself.
    AgentModelProfile for StageId::AgentModel {
        /// Summary of the operational self-model.
        self_model: String,
        /// Beliefs about capabilities, limitations, and other agents.
        beliefs: Vec<String>,
    }
}

stage_profile! {
    /// Planning and ongoing actions.
    ExecutiveFunctionProfile for StageId::ExecutiveFunction {
        /// The current plan of execution.
        plan: String,
        /// Ongoing actions.
        actions: Vec<String>,
    }
}

stage_profile! {
    /// Task selection and frustration tracking.
    CognitiveControlProfile for StageId::CognitiveControl {
        /// Current control-flow state.
        control_flow_state: String,
        /// Failure ratio above which the stage switches task.
        frustration_threshold: f64,
    }
}

stage_profile! {
    /// The single task being carried out.
    TaskProsecutionProfile for StageId::TaskProsecution {
        /// The task in progress.
        current_task: String,
        /// Conditions that mark the task as succeeded.
        success_criteria: Vec<String>,
    }
}

/// The profile of one stage, tagged by stage kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageProfile {
    /// See [`AspirationalProfile`].
    Aspirational(AspirationalProfile),
    /// See [`GlobalStrategyProfile`].
    GlobalStrategy(GlobalStrategyProfile),
    /// See [`AgentModelProfile`].
    AgentModel(AgentModelProfile),
    /// See [`ExecutiveFunctionProfile`].
    ExecutiveFunction(ExecutiveFunctionProfile),
    /// See [`CognitiveControlProfile`].
    CognitiveControl(CognitiveControlProfile),
    /// See [`TaskProsecutionProfile`].
    TaskProsecution(TaskProsecutionProfile),
}

impl StageProfile {
    /// A default profile for `stage`.
    pub fn default_for(stage: StageId) -> Self {
        match stage {
            StageId::Aspirational => Self::Aspirational(Default::default()),
            StageId::GlobalStrategy => Self::GlobalStrategy(Default::default()),
            StageId::AgentModel => Self::AgentModel(Default::default()),
            StageId::ExecutiveFunction => Self::ExecutiveFunction(Default::default()),
            StageId::CognitiveControl => Self::CognitiveControl(Default::default()),
            StageId::TaskProsecution => Self::TaskProsecution(Default::default()),
        }
    }

    /// The stage this profile belongs to.
    pub fn stage(&self) -> StageId {
        match self {
            Self::Aspirational(_) => AspirationalProfile::STAGE,
            Self::GlobalStrategy(_) => GlobalStrategyProfile::STAGE,
            Self::AgentModel(_) => AgentModelProfile::STAGE,
            Self::ExecutiveFunction(_) => ExecutiveFunctionProfile::STAGE,
            Self::CognitiveControl(_) => CognitiveControlProfile::STAGE,
            Self::TaskProsecution(_) => TaskProsecutionProfile::STAGE,
        }
    }

    /// The amendable fields of `stage`.
    pub fn fields_of(stage: StageId) -> &'static [&'static str] {
        match stage {
            StageId::Aspirational => AspirationalProfile::FIELDS,
            StageId::GlobalStrategy => GlobalStrategyProfile::FIELDS,
            StageId::AgentModel => AgentModelProfile::FIELDS,
            StageId::ExecutiveFunction => ExecutiveFunctionProfile::FIELDS,
            StageId::CognitiveControl => CognitiveControlProfile::FIELDS,
            StageId::TaskProsecution => TaskProsecutionProfile::FIELDS,
        }
    }

    /// Current value of every field, in declaration order.
    pub fn values(&self) -> Vec<(&'static str, ConfigValue)> {
        match self {
            Self::Aspirational(p) => p.values(),
            Self::GlobalStrategy(p) => p.values(),
            Self::AgentModel(p) => p.values(),
            Self::ExecutiveFunction(p) => p.values(),
            Self::CognitiveControl(p) => p.values(),
            Self::TaskProsecution(p) => p.values(),
        }
    }

    /// Current value of one field.
    pub fn get(&self, field: &str) -> Option<ConfigValue> {
        self.values()
            .into_iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    /// Applies every assignment in `amendment`, or none of them.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownField`] if any key is not a declared field, or
    /// [`ConfigError::TypeMismatch`] if any value has the wrong shape. The
    /// profile is unchanged on error.
    pub fn amend(&mut self, amendment: &Amendment) -> Result<(), ConfigError> {
        let mut candidate = self.clone();
        for (field, value) in amendment {
            candidate.set_field(field, value)?;
        }
        *self = candidate;
        Ok(())
    }

    fn set_field(&mut self, field: &str, value: &ConfigValue) -> Result<(), ConfigError> {
        match self {
            Self::Aspirational(p) => p.set_field(field, value),
            Self::GlobalStrategy(p) => p.set_field(field, value),
            Self::AgentModel(p) => p.set_field(field, value),
            Self::ExecutiveFunction(p) => p.set_field(field, value),
            Self::CognitiveControl(p) => p.set_field(field, value),
            Self::TaskProsecution(p) => p.set_field(field, value),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage sections
// ---------------------------------------------------------------------------

fn default_budget() -> f64 {
    1.5
}

fn default_resources() -> Vec<EntryName> {
    vec![EntryName::from_literal("currency")]
}

/// Configuration of one stage: its budget, the registry entries to build for
/// it, and its profile fields (flattened into the same table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSection<P> {
    /// Initial budget in dollars.
    #[serde(default = "default_budget")]
    pub budget: f64,
    /// Capability factories to instantiate.
    #[serde(default)]
    pub capabilities: Vec<EntryName>,
    /// Resource factories to instantiate.
    #[serde(default = "default_resources")]
    pub resources: Vec<EntryName>,
    /// Product factories to instantiate.
    #[serde(default)]
    pub products: Vec<EntryName>,
    /// Stage-specific profile fields.
    #[serde(flatten)]
    pub profile: P,
    /// Keys that are neither section settings nor profile fields. Rejected
    /// when the section is resolved.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl<P: Default> Default for StageSection<P> {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            capabilities: Vec::new(),
            resources: default_resources(),
            products: Vec::new(),
            profile: P::default(),
            unknown: BTreeMap::new(),
        }
    }
}

/// Everything needed to construct one stage, independent of its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    /// Which stage.
    pub stage: StageId,
    /// Initial ledger balance.
    pub budget: Money,
    /// Capability factories to instantiate.
    pub capabilities: Vec<EntryName>,
    /// Resource factories to instantiate.
    pub resources: Vec<EntryName>,
    /// Product factories to instantiate.
    pub products: Vec<EntryName>,
    /// Initial profile.
    pub profile: StageProfile,
}

impl<P> StageSection<P> {
    fn to_spec(&self, stage: StageId, wrap: impl FnOnce(P) -> StageProfile) -> Result<StageSpec, ConfigError>
    where
        P: Clone,
    {
        if let Some(key) = self.unknown.keys().next() {
            return Err(ConfigError::UnknownField {
                stage,
                field: key.clone(),
            });
        }
        let budget = Money::from_dollars(self.budget)
            .filter(|m| !m.is_negative())
            .ok_or_else(|| {
                ConfigError::invalid(format!(
                    "stages.{stage}.budget must be a non-negative number, got {}",
                    self.budget
                ))
            })?;
        Ok(StageSpec {
            stage,
            budget,
            capabilities: self.capabilities.clone(),
            resources: self.resources.clone(),
            products: self.products.clone(),
            profile: wrap(self.profile.clone()),
        })
    }
}

/// Configuration of all six stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    /// Stage 1.
    pub aspirational: StageSection<AspirationalProfile>,
    /// Stage 2.
    pub global_strategy: StageSection<GlobalStrategyProfile>,
    /// Stage 3.
    pub agent_model: StageSection<AgentModelProfile>,
    /// Stage 4.
    pub executive_function: StageSection<ExecutiveFunctionProfile>,
    /// Stage 5.
    pub cognitive_control: StageSection<CognitiveControlProfile>,
    /// Stage 6.
    pub task_prosecution: StageSection<TaskProsecutionProfile>,
}

impl StagesConfig {
    /// Resolves the construction spec of one stage.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the stage's budget is negative or not finite.
    pub fn spec(&self, stage: StageId) -> Result<StageSpec, ConfigError> {
        match stage {
            StageId::Aspirational => self.aspirational.to_spec(stage, StageProfile::Aspirational),
            StageId::GlobalStrategy => self.global_strategy.to_spec(stage, StageProfile::GlobalStrategy),
            StageId::AgentModel => self.agent_model.to_spec(stage, StageProfile::AgentModel),
            StageId::ExecutiveFunction => {
                self.executive_function.to_spec(stage, StageProfile::ExecutiveFunction)
            }
            StageId::CognitiveControl => {
                self.cognitive_control.to_spec(stage, StageProfile::CognitiveControl)
            }
            StageId::TaskProsecution => self.task_prosecution.to_spec(stage, StageProfile::TaskProsecution),
        }
    }

    /// Resolves all six specs in pipeline order.
    ///
    /// # Errors
    ///
    /// The first invalid stage section.
    pub fn specs(&self) -> Result<Vec<StageSpec>, ConfigError> {
        StageId::ALL.into_iter().map(|id| self.spec(id)).collect()
    }
}

// ---------------------------------------------------------------------------
// Pipeline settings
// ---------------------------------------------------------------------------

/// Pipeline-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Capacity of every inter-stage queue.
    pub queue_capacity: usize,
    /// Longest a stage waits for input before re-checking the stop signal.
    pub poll_interval_ms: u64,
    /// Per-stage configuration.
    pub stages: StagesConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            poll_interval_ms: 250,
            stages: StagesConfig::default(),
        }
    }
}

impl PipelineSettings {
    /// Checks the settings without building anything.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("pipeline.queue_capacity must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("pipeline.poll_interval_ms must be at least 1"));
        }
        self.stages.specs().map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Gateway settings
// ---------------------------------------------------------------------------

/// Prices of one tier in dollars per thousand tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSettings {
    /// Request price.
    pub input: f64,
    /// Reply price.
    pub output: f64,
}

/// Reasoning-gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Balance (dollars) strictly above which the premium tier is used.
    pub threshold: f64,
    /// Higher-capability, higher-cost tier.
    pub premium: TierSpec,
    /// Cheaper tier.
    pub economy: TierSpec,
    /// Prices keyed by tier name.
    pub prices: HashMap<String, PriceSettings>,
    /// Token-count estimator parameters.
    pub counter: HeuristicTokenCounter,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            premium: TierSpec {
                name: TierName::from_literal("premium"),
                model: ModelId::from_literal("openai/gpt-4"),
                max_output_tokens: 1024,
            },
            economy: TierSpec {
                name: TierName::from_literal("economy"),
                model: ModelId::from_literal("openai/gpt-3.5-turbo"),
                max_output_tokens: 1024,
            },
            prices: HashMap::from([
                (
                    "premium".to_string(),
                    PriceSettings {
                        input: 0.03,
                        output: 0.06,
                    },
                ),
                (
                    "economy".to_string(),
                    PriceSettings {
                        input: 0.0015,
                        output: 0.002,
                    },
                ),
            ]),
            counter: HeuristicTokenCounter::default(),
        }
    }
}

impl GatewaySettings {
    /// Converts the settings into a tier policy and price table.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the threshold or a price is negative or
    /// not finite, a price key is empty, or either tier has no price.
    pub fn resolve(&self) -> Result<(TierPolicy, PriceTable), ConfigError> {
        let threshold = Money::from_dollars(self.threshold)
            .filter(|m| !m.is_negative())
            .ok_or_else(|| {
                ConfigError::invalid(format!(
                    "gateway.threshold must be a non-negative number, got {}",
                    self.threshold
                ))
            })?;

        let mut table = PriceTable::new();
        for (tier, price) in &self.prices {
            let name = TierName::new(tier.as_str())
                .ok_or_else(|| ConfigError::invalid("gateway.prices keys must not be empty"))?;
            let unit = |dollars: f64, side: &str| {
                UnitPrice::from_dollars_per_thousand(dollars).ok_or_else(|| {
                    ConfigError::invalid(format!(
                        "gateway.prices.{tier}.{side} must be a non-negative number, got {dollars}"
                    ))
                })
            };
            table.insert(
                name,
                TierPrice {
                    input: unit(price.input, "input")?,
                    output: unit(price.output, "output")?,
                },
            );
        }

        let policy = TierPolicy::new(threshold, self.premium.clone(), self.economy.clone());
        table
            .covers(&policy)
            .map_err(|e| ConfigError::invalid(format!("gateway.prices: {e}")))?;
        Ok((policy, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aspirational() -> StageProfile {
        StageProfile::Aspirational(AspirationalProfile {
            mission: "original".into(),
            values: vec!["honesty".into()],
        })
    }

    #[test]
    fn amending_existing_fields_sets_both() {
        let mut profile = aspirational();
        let amendment = Amendment::from([
            ("mission".to_string(), ConfigValue::from("X")),
            (
                "values".to_string(),
                ConfigValue::List(vec!["a".into(), "b".into()]),
            ),
        ]);
        profile.amend(&amendment).unwrap();
        assert_eq!(profile.get("mission"), Some(ConfigValue::from("X")));
        assert_eq!(
            profile.get("values"),
            Some(ConfigValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn unknown_key_applies_nothing() {
        let mut profile = aspirational();
        let before = profile.clone();
        let amendment = Amendment::from([
            ("mission".to_string(), ConfigValue::from("changed")),
            ("bogus".to_string(), ConfigValue::Number(1.0)),
        ]);
        let err = profile.amend(&amendment).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownField {
                stage: StageId::Aspirational,
                field: "bogus".into(),
            }
        );
        assert_eq!(err.kind(), crate::errors::ErrorKind::InvalidArgument);
        assert_eq!(profile, before);
    }

    #[test]
    fn wrong_value_shape_applies_nothing() {
        let mut profile = aspirational();
        let before = profile.clone();
        let amendment = Amendment::from([
            ("mission".to_string(), ConfigValue::List(vec!["x".into()])),
            ("values".to_string(), ConfigValue::List(vec!["y".into()])),
        ]);
        assert!(matches!(
            profile.amend(&amendment),
            Err(ConfigError::TypeMismatch { .. })
        ));
        assert_eq!(profile, before);
    }

    #[test]
    fn fields_are_declared_per_stage() {
        assert_eq!(
            StageProfile::fields_of(StageId::CognitiveControl),
            &["control_flow_state", "frustration_threshold"]
        );
        for id in StageId::ALL {
            assert_eq!(StageProfile::default_for(id).stage(), id);
        }
    }

    #[test]
    fn amendment_values_deserialize_from_json() {
        let amendment: Amendment =
            serde_json::from_str(r#"{"mission": "X", "values": ["a", "b"], "bogus": 1}"#).unwrap();
        assert_eq!(amendment["mission"], ConfigValue::from("X"));
        assert_eq!(amendment["bogus"], ConfigValue::Number(1.0));
    }

    #[test]
    fn default_settings_are_valid() {
        PipelineSettings::default().validate().unwrap();
        let (policy, table) = GatewaySettings::default().resolve().unwrap();
        assert_eq!(policy.threshold(), Money::from_dollars(1.0).unwrap());
        assert!(table.covers(&policy).is_ok());
    }

    #[test]
    fn negative_budget_is_rejected() {
        let mut settings = PipelineSettings::default();
        settings.stages.agent_model.budget = -1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_tier_price_is_rejected() {
        let mut settings = GatewaySettings::default();
        settings.prices.remove("economy");
        assert!(settings.resolve().is_err());
    }

    #[test]
    fn misspelled_stage_key_is_rejected() {
        let stages: StagesConfig = serde_json::from_str(
            r#"{ "aspirational": { "budget": 2.0, "misson": "typo" } }"#,
        )
        .unwrap();
        assert_eq!(
            stages.specs().unwrap_err(),
            ConfigError::UnknownField {
                stage: StageId::Aspirational,
                field: "misson".into(),
            }
        );
    }

    #[test]
    fn declared_stage_keys_are_not_leftovers() {
        let stages: StagesConfig = serde_json::from_str(
            r#"{ "cognitive_control": {
                    "budget": 0.5,
                    "resources": ["currency"],
                    "control_flow_state": "idle",
                    "frustration_threshold": 3
               } }"#,
        )
        .unwrap();
        assert!(stages.cognitive_control.unknown.is_empty());
        let spec = stages.spec(StageId::CognitiveControl).unwrap();
        assert_eq!(spec.profile.get("control_flow_state"), Some(ConfigValue::from("idle")));
        assert_eq!(
            spec.profile.get("frustration_threshold"),
            Some(ConfigValue::Number(3.0))
        );
    }

    #[test]
    fn stage_specs_carry_profile_and_budget() {
        let mut stages = StagesConfig::default();
        stages.aspirational.profile.mission = "Lifelong learning for all".into();
        stages.aspirational.capabilities = vec![EntryName::new("ethical_decision_making").unwrap()];
        let spec = stages.spec(StageId::Aspirational).unwrap();
        assert_eq!(spec.budget, Money::from_dollars(1.5).unwrap());
        assert_eq!(spec.resources, vec![EntryName::new("currency").unwrap()]);
        assert_eq!(
            spec.profile.get("mission"),
            Some(ConfigValue::from("Lifelong learning for all"))
        );
    }
}
