//! `ace` command-line entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load the TOML file given by `--config` (or
//!    `ACE_CONFIG`) and validate every section.
//! 2. **Wire observability**: install the `tracing-subscriber` stack, with an
//!    optional OpenTelemetry OTLP exporter. Spans and events from every crate
//!    in the workspace flow through it.
//! 3. **Construct infrastructure**: build the reasoning backend, wrap it in a
//!    [`ReasoningGateway`], and inject both into the [`PipelineBuilder`].
//! 4. **Run**: start the stages, submit messages at either end, print what
//!    leaves the pipeline, and stop on Ctrl-C or after `--duration-secs`.

mod config;
mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ace_core::{Amendment, ConfigValue, Envelope, Factories, StageId, StageProfile};
use ace_stages::{PipelineBuilder, ReasoningGateway, RelayBehavior, Stage};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "ace", version, about = "Six-stage layered agent pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the pipeline, submit messages, and print whatever leaves it.
    Run(RunArgs),
    /// Validate a configuration file and print it with defaults filled in.
    CheckConfig {
        #[arg(short, long, env = "ACE_CONFIG")]
        config: PathBuf,
    },
    /// List the stages with their levels and amendable fields.
    Stages,
    /// Apply an amendment to one stage's configuration and print the result.
    AmendPreview(AmendArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "ACE_CONFIG")]
    config: Option<PathBuf>,
    /// Message submitted to the top of the pipeline. Repeatable.
    #[arg(long = "input")]
    inputs: Vec<String>,
    /// Message submitted to the bottom of the pipeline. Repeatable.
    #[arg(long = "from-below")]
    from_below: Vec<String>,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration_secs: Option<u64>,
    /// Forward messages without reasoning calls.
    #[arg(long)]
    relay: bool,
}

#[derive(Debug, Args)]
struct AmendArgs {
    /// Configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "ACE_CONFIG")]
    config: Option<PathBuf>,
    /// Stage name (`agent_model`, `AgentModelLayer`) or level (`3`).
    #[arg(long)]
    stage: String,
    /// `field=value`. Numbers and JSON string lists are recognised; anything
    /// else is text. Repeatable.
    #[arg(long = "set", value_parser = parse_assignment, required = true)]
    set: Vec<(String, ConfigValue)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::CheckConfig { config } => check_config(&config),
        Command::Stages => {
            list_stages();
            Ok(())
        }
        Command::AmendPreview(args) => amend_preview(args),
    }
}

fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load_or_default(args.config.as_deref())?;
    let _telemetry = telemetry::init(&config.log)?;

    let backend = config
        .backend
        .build()
        .context("building the reasoning backend")?;
    let gateway = ReasoningGateway::from_settings(backend, &config.gateway)
        .context("building the reasoning gateway")?;
    info!(
        backend = gateway.backend_name(),
        threshold = %gateway.policy().threshold(),
        "Reasoning gateway ready"
    );

    let mut builder = PipelineBuilder::new(config.pipeline_settings()).gateway(Arc::new(gateway));
    if args.relay {
        builder = builder.default_behavior(Arc::new(RelayBehavior));
    }
    let (pipeline, mut io) = builder.build().context("building the pipeline")?;
    pipeline.start()?;

    for text in &args.inputs {
        let id = io.top.submit_payload(text.as_str()).await?;
        info!(message_id = %id, "Submitted from above");
    }
    for text in &args.from_below {
        let id = io.bottom.submit_payload(text.as_str()).await?;
        info!(message_id = %id, "Submitted from below");
    }

    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Run duration elapsed");
                break;
            }
            result = &mut ctrl_c => {
                result.context("listening for Ctrl-C")?;
                info!("Interrupted");
                break;
            }
            Some(envelope) = io.top.recv() => print_envelope("top", &envelope)?,
            Some(envelope) = io.bottom.recv() => print_envelope("bottom", &envelope)?,
        }
    }

    pipeline.stop().await?;
    while let Some(envelope) = io.top.try_recv() {
        print_envelope("top", &envelope)?;
    }
    while let Some(envelope) = io.bottom.try_recv() {
        print_envelope("bottom", &envelope)?;
    }

    let balances: Vec<_> = pipeline
        .stages()
        .map(|stage| {
            let stats = stage.stats();
            serde_json::json!({
                "stage": stage.id(),
                "balance": stage.balance().as_dollars(),
                "processed": stats.processed,
                "failed": stats.failed,
                "dropped": stats.dropped,
            })
        })
        .collect();
    println!("{}", serde_json::json!({ "summary": balances }));
    Ok(())
}

fn print_envelope(side: &str, envelope: &Envelope) -> Result<()> {
    let line = serde_json::to_string(&serde_json::json!({ "side": side, "envelope": envelope }))
        .context("serialising envelope")?;
    println!("{line}");
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = AppConfig::load(path)?;
    let text = serde_json::to_string_pretty(&config).context("serialising configuration")?;
    println!("{text}");
    Ok(())
}

fn list_stages() {
    for id in StageId::ALL {
        println!("{}  {id}", id.level());
        println!("    {}", id.charter());
        println!("    fields: {}", StageProfile::fields_of(id).join(", "));
    }
}

fn amend_preview(args: AmendArgs) -> Result<()> {
    let config = load_or_default(args.config.as_deref())?;
    let id: StageId = args.stage.parse()?;
    let spec = config.stages.spec(id)?;
    let stage = Stage::from_spec(
        &spec,
        &Factories::builtin(),
        Arc::new(RelayBehavior),
        None,
        Duration::from_millis(config.pipeline.poll_interval_ms),
    )?;

    let amendment: Amendment = args.set.into_iter().collect();
    stage
        .amend(&amendment)
        .with_context(|| format!("amendment rejected by the {id} stage"))?;

    let text = serde_json::to_string_pretty(&stage.profile()).context("serialising profile")?;
    println!("{text}");
    Ok(())
}

fn parse_assignment(raw: &str) -> Result<(String, ConfigValue), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{raw}'"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    let value = serde_json::from_str::<ConfigValue>(value.trim())
        .unwrap_or_else(|_| ConfigValue::Text(value.to_string()));
    Ok((field.to_string(), value))
}
