//! Six-stage pipeline: construction, wiring, and lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ace_core::{
    ConfigError, Factories, InvalidStageId, LedgerError, Money, PipelineSettings, RegistryError,
    StageId,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::behavior::{DeliberativeBehavior, StageBehavior};
use crate::gateway::ReasoningGateway;
use crate::queue::{wire, PipelineIo};
use crate::stage::{Stage, StageState};

/// Errors reported synchronously by the pipeline API.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration did not validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A registry entry could not be instantiated.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A stage ledger could not be created.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A level or name did not identify a stage.
    #[error(transparent)]
    UnknownStage(#[from] InvalidStageId),

    /// A stage was given its queues twice.
    #[error("Stage {0} is already wired")]
    AlreadyWired(StageId),

    /// `start` was called without a Tokio runtime.
    #[error("Pipeline start requires a running Tokio runtime")]
    NoRuntime,

    /// `start` was called on a running pipeline.
    #[error("Pipeline is already running")]
    AlreadyStarted,

    /// `stop` was called before `start`.
    #[error("Pipeline has not been started")]
    NotStarted,

    /// The pipeline has been stopped; it cannot be started or stopped again.
    #[error("Pipeline has already been stopped")]
    AlreadyStopped,

    /// A stage task ended abnormally.
    #[error("Stage {stage} task failed: {message}")]
    Join {
        /// The stage whose task failed.
        stage: StageId,
        /// Join error description.
        message: String,
    },

    /// The task joining the stages ended before reporting, usually because
    /// the runtime is shutting down.
    #[error("Pipeline stop was interrupted before every stage finished")]
    StopInterrupted,

    /// The external end of a queue is closed.
    #[error("Pipeline {side} queue is closed")]
    Closed {
        /// `"top"` or `"bottom"`.
        side: &'static str,
    },
}

impl PipelineError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ace_core::ErrorKind {
        match self {
            PipelineError::Config(e) => e.kind(),
            PipelineError::Registry(e) => e.kind(),
            PipelineError::Ledger(e) => e.kind(),
            PipelineError::UnknownStage(e) => e.kind(),
            PipelineError::Join { .. } | PipelineError::StopInterrupted => {
                ace_core::ErrorKind::Stage
            }
            PipelineError::AlreadyWired(_)
            | PipelineError::NoRuntime
            | PipelineError::AlreadyStarted
            | PipelineError::NotStarted
            | PipelineError::AlreadyStopped
            | PipelineError::Closed { .. } => ace_core::ErrorKind::InvalidArgument,
        }
    }
}

/// Configures and builds a [`Pipeline`].
pub struct PipelineBuilder {
    settings: PipelineSettings,
    gateway: Option<Arc<ReasoningGateway>>,
    default_behavior: Arc<dyn StageBehavior>,
    behaviors: HashMap<StageId, Arc<dyn StageBehavior>>,
    factories: Factories,
}

impl PipelineBuilder {
    /// Starts a builder with the built-in factories and the deliberative
    /// behaviour on every stage.
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            gateway: None,
            default_behavior: Arc::new(DeliberativeBehavior),
            behaviors: HashMap::new(),
            factories: Factories::builtin(),
        }
    }

    /// Attaches the reasoning gateway shared by every stage.
    pub fn gateway(mut self, gateway: Arc<ReasoningGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Sets the behaviour of stages without an override.
    pub fn default_behavior(mut self, behavior: Arc<dyn StageBehavior>) -> Self {
        self.default_behavior = behavior;
        self
    }

    /// Overrides the behaviour of one stage.
    pub fn behavior(mut self, stage: StageId, behavior: Arc<dyn StageBehavior>) -> Self {
        self.behaviors.insert(stage, behavior);
        self
    }

    /// Replaces the factory tables.
    pub fn factories(mut self, factories: Factories) -> Self {
        self.factories = factories;
        self
    }

    /// Builds the six stages, their registries and ledgers, and wires every
    /// queue.
    ///
    /// # Errors
    ///
    /// The first configuration, registry, or ledger error encountered. No
    /// stage is running on error.
    pub fn build(self) -> Result<(Pipeline, PipelineIo), PipelineError> {
        self.settings.validate()?;
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);

        let mut stages = Vec::with_capacity(StageId::ALL.len());
        for spec in self.settings.stages.specs()? {
            let behavior = self
                .behaviors
                .get(&spec.stage)
                .cloned()
                .unwrap_or_else(|| Arc::clone(&self.default_behavior));
            let stage = Stage::from_spec(
                &spec,
                &self.factories,
                behavior,
                self.gateway.clone(),
                poll_interval,
            )?;
            stages.push(Arc::new(stage));
        }

        let wiring = wire(self.settings.queue_capacity);
        for (stage, (inbox, outbox)) in stages.iter().zip(wiring.ends) {
            stage.connect(inbox, outbox)?;
        }

        info!(
            queue_capacity = self.settings.queue_capacity,
            poll_interval_ms = self.settings.poll_interval_ms,
            gateway = self.gateway.is_some(),
            "Pipeline built"
        );
        Ok((
            Pipeline {
                stages,
                stop: CancellationToken::new(),
                lifecycle: Mutex::new(Lifecycle::Built),
            },
            wiring.io,
        ))
    }
}

/// First stage task that ended abnormally, with its join error.
type JoinFailure = Option<(StageId, String)>;

enum Lifecycle {
    Built,
    Running(Vec<(StageId, JoinHandle<()>)>),
    /// Stop raised; the joiner task publishes its result here.
    Stopping(watch::Receiver<Option<JoinFailure>>),
    Stopped,
}

/// The six stages and their lifecycle.
///
/// Dropping a running pipeline raises the stop signal without waiting.
pub struct Pipeline {
    stages: Vec<Arc<Stage>>,
    stop: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .field("stopping", &self.stop.is_cancelled())
            .finish()
    }
}

impl Pipeline {
    /// Spawns one task per stage on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NoRuntime`] outside a Tokio runtime.
    /// - [`PipelineError::AlreadyStarted`] if running.
    /// - [`PipelineError::AlreadyStopped`] if stopped.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Built => {}
            Lifecycle::Running(_) => return Err(PipelineError::AlreadyStarted),
            Lifecycle::Stopping(_) | Lifecycle::Stopped => {
                return Err(PipelineError::AlreadyStopped)
            }
        }
        let runtime = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;

        let handles: Vec<_> = self
            .stages
            .iter()
            .map(|stage| {
                let task = Arc::clone(stage).run(self.stop.clone());
                (stage.id(), runtime.spawn(task))
            })
            .collect();
        *lifecycle = Lifecycle::Running(handles);
        info!("Pipeline started");
        Ok(())
    }

    /// Raises the stop signal and waits for every stage task to finish.
    ///
    /// The stage tasks are joined by a separate task, so dropping this
    /// future does not lose them: a later call waits for the same join.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotStarted`] before `start`.
    /// - [`PipelineError::AlreadyStopped`] once a stop has completed.
    /// - [`PipelineError::Join`] naming the first stage whose task failed;
    ///   every task is still awaited.
    /// - [`PipelineError::StopInterrupted`] if the joiner task vanished.
    pub async fn stop(&self) -> Result<(), PipelineError> {
        let mut joined = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(handles) => {
                    info!("Stopping pipeline");
                    self.stop.cancel();
                    let joined = spawn_joiner(handles);
                    *lifecycle = Lifecycle::Stopping(joined.clone());
                    joined
                }
                Lifecycle::Stopping(joined) => {
                    info!("Waiting for an earlier stop to finish");
                    *lifecycle = Lifecycle::Stopping(joined.clone());
                    joined
                }
                Lifecycle::Built => {
                    *lifecycle = Lifecycle::Built;
                    return Err(PipelineError::NotStarted);
                }
                Lifecycle::Stopped => return Err(PipelineError::AlreadyStopped),
            }
        };

        let failure = match joined.wait_for(Option::is_some).await {
            Ok(result) => (*result).clone().flatten(),
            Err(_) => {
                error!("Stage joiner ended without a result");
                return Err(PipelineError::StopInterrupted);
            }
        };
        *self.lifecycle.lock() = Lifecycle::Stopped;

        if let Some((stage, message)) = failure {
            return Err(PipelineError::Join { stage, message });
        }
        debug_assert!(self.stages.iter().all(|s| s.state() == StageState::Stopped));
        info!(balances = ?self.balances(), "Pipeline stopped");
        Ok(())
    }

    /// Whether `start` has been called and the stage tasks have not all
    /// finished.
    pub fn is_running(&self) -> bool {
        match &*self.lifecycle.lock() {
            Lifecycle::Running(_) => true,
            Lifecycle::Stopping(joined) => joined.borrow().is_none(),
            Lifecycle::Built | Lifecycle::Stopped => false,
        }
    }

    /// The stage with the given identity.
    pub fn lookup(&self, id: StageId) -> &Arc<Stage> {
        &self.stages[id.index()]
    }

    /// The stage at a one-based level.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownStage`] outside 1..=6.
    pub fn lookup_level(&self, level: u8) -> Result<&Arc<Stage>, PipelineError> {
        Ok(self.lookup(StageId::from_level(level)?))
    }

    /// The stage with the given name (see [`StageId`]'s `FromStr`).
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownStage`] if the name matches no stage.
    pub fn lookup_name(&self, name: &str) -> Result<&Arc<Stage>, PipelineError> {
        Ok(self.lookup(name.parse::<StageId>()?))
    }

    /// All stages, top to bottom.
    pub fn stages(&self) -> impl Iterator<Item = &Arc<Stage>> {
        self.stages.iter()
    }

    /// State of every stage, top to bottom.
    pub fn states(&self) -> Vec<(StageId, StageState)> {
        self.stages.iter().map(|s| (s.id(), s.state())).collect()
    }

    /// Remaining budget of every stage, top to bottom.
    pub fn balances(&self) -> Vec<(StageId, Money)> {
        self.stages.iter().map(|s| (s.id(), s.balance())).collect()
    }
}

/// Awaits every stage task on its own task and publishes the first failure.
fn spawn_joiner(handles: Vec<(StageId, JoinHandle<()>)>) -> watch::Receiver<Option<JoinFailure>> {
    let (done, joined) = watch::channel(None);
    tokio::spawn(async move {
        let mut first_failure = None;
        for (stage, handle) in handles {
            if let Err(e) = handle.await {
                error!(%stage, error = %e, "Stage task failed");
                first_failure.get_or_insert((stage, e.to_string()));
            }
        }
        done.send_replace(Some(first_failure));
    });
    joined
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
