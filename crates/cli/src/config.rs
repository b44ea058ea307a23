//! Application configuration file.
//!
//! ```toml
//! [pipeline]
//! queue_capacity = 64
//! poll_interval_ms = 250
//!
//! [gateway]
//! threshold = 1.0
//!
//! [backend]
//! kind = "openrouter"
//!
//! [stages.aspirational]
//! budget = 1.5
//! mission = "..."
//!
//! [log]
//! format = "pretty"
//! ```

use std::path::Path;

use ace_core::{Factories, GatewaySettings, PipelineSettings, StageId, StagesConfig};
use ace_llm::BackendConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Queue settings from the `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Capacity of every inter-stage queue.
    pub queue_capacity: usize,
    /// Idle wait before a stage re-checks the stop signal.
    pub poll_interval_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let defaults = PipelineSettings::default();
        Self {
            queue_capacity: defaults.queue_capacity,
            poll_interval_ms: defaults.poll_interval_ms,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// The `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// OTLP gRPC endpoint; traces are exported when set.
    pub otlp_endpoint: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".into(),
            otlp_endpoint: None,
        }
    }
}

/// The whole configuration file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineSection,
    pub gateway: GatewaySettings,
    pub backend: BackendConfig,
    pub stages: StagesConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Reads, parses, and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("loading configuration file {}", path.display()))?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("parsing TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Pipeline settings with the stage sections folded in.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            queue_capacity: self.pipeline.queue_capacity,
            poll_interval_ms: self.pipeline.poll_interval_ms,
            stages: self.stages.clone(),
        }
    }

    /// Checks every section without building anything.
    pub fn validate(&self) -> Result<()> {
        self.pipeline_settings()
            .validate()
            .context("invalid [pipeline] or [stages] section")?;
        self.gateway.resolve().context("invalid [gateway] section")?;
        if self.backend.timeout_secs == 0 {
            bail!("backend.timeout_secs must be at least 1");
        }

        let factories = Factories::builtin();
        for id in StageId::ALL {
            let spec = self.stages.spec(id)?;
            let tables = [
                ("capabilities", &spec.capabilities, factories.capabilities.names()),
                ("resources", &spec.resources, factories.resources.names()),
                ("products", &spec.products, factories.products.names()),
            ];
            for (section, wanted, known) in tables {
                if let Some(unknown) = wanted.iter().find(|n| !known.contains(n)) {
                    bail!(
                        "stages.{id}.{section}: no factory named '{unknown}' (known: {})",
                        known
                            .iter()
                            .map(|n| n.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ace_core::{ConfigValue, Money};
    use ace_llm::BackendKind;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.pipeline.queue_capacity, 64);
        assert_eq!(config.pipeline.poll_interval_ms, 250);
    }

    #[test]
    fn full_file_parses() {
        let config = AppConfig::parse(
            r#"
            [pipeline]
            queue_capacity = 16
            poll_interval_ms = 100

            [gateway]
            threshold = 0.5

            [gateway.prices.premium]
            input = 0.03
            output = 0.06

            [gateway.prices.economy]
            input = 0.0015
            output = 0.002

            [backend]
            kind = "echo"

            [stages.aspirational]
            budget = 2.0
            capabilities = ["ethical_decision_making"]
            mission = "Reduce suffering"
            values = ["honesty", "care"]

            [stages.cognitive_control]
            frustration_threshold = 3

            [log]
            format = "json"
            filter = "ace=debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.queue_capacity, 16);
        assert_eq!(config.backend.kind, BackendKind::Echo);
        assert_eq!(config.log.format, LogFormat::Json);

        let spec = config.stages.spec(StageId::Aspirational).unwrap();
        assert_eq!(spec.budget, Money::from_dollars(2.0).unwrap());
        assert_eq!(
            spec.profile.get("mission"),
            Some(ConfigValue::from("Reduce suffering"))
        );
        let control = config.stages.spec(StageId::CognitiveControl).unwrap();
        assert_eq!(
            control.profile.get("frustration_threshold"),
            Some(ConfigValue::Number(3.0))
        );
    }

    #[test]
    fn bundled_example_is_valid() {
        let config = AppConfig::parse(include_str!("../../../ace.toml")).unwrap();
        let products = config.stages.spec(StageId::TaskProsecution).unwrap().products;
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].as_str(), "status_report");
    }

    #[test]
    fn unknown_factory_is_rejected() {
        let err = AppConfig::parse(
            r#"
            [stages.agent_model]
            capabilities = ["clairvoyance"]
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("clairvoyance"));
    }

    #[test]
    fn misspelled_stage_key_is_rejected() {
        let err = AppConfig::parse(
            r#"
            [stages.global_strategy]
            strategyy = "Prefer small steps"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("strategyy"));
    }

    #[test]
    fn negative_budget_is_rejected() {
        let err = AppConfig::parse(
            r#"
            [stages.task_prosecution]
            budget = -0.5
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("budget"));
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        assert!(AppConfig::parse("[pipeline]\nqueue_capacity = 0\n").is_err());
    }
}
