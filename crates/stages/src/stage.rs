//! A single pipeline stage and its run loop.
//!
//! ```text
//! Idle ──start──▶ Running ──stop signal──▶ Draining ──▶ Stopped
//! ```
//!
//! `Stopped` is terminal. The inbox is moved into the run loop on the first
//! start, so a stopped stage cannot be run again.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ace_core::{
    Amendment, BudgetLedger, Capability, ConfigError, Envelope, ErrorKind, Factories,
    FactoryContext, Flow, Ledger, Money, Origin, Product, Registry, RegistryError, RegistryKind,
    Resource, StageId, StageProfile, StageSpec,
};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::behavior::{Emit, StageBehavior, StageContext, StageError};
use crate::gateway::ReasoningGateway;
use crate::pipeline::PipelineError;
use crate::queue::{StageInbox, StageOutbox};

/// Lifecycle state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Constructed, not yet started.
    Idle,
    /// Processing items.
    Running,
    /// Stop observed; finishing the in-flight item.
    Draining,
    /// Loop exited. Terminal.
    Stopped,
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageState::Idle => "idle",
            StageState::Running => "running",
            StageState::Draining => "draining",
            StageState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Counters of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StageStats {
    /// Envelopes handled without error (including relayed error envelopes).
    pub processed: u64,
    /// Envelopes whose behaviour failed or panicked.
    pub failed: u64,
    /// Envelopes currently being handled (0 or 1).
    pub in_flight: u64,
    /// Outgoing envelopes dropped because a neighbour queue was full.
    pub dropped: u64,
}

/// One of the six pipeline stages.
pub struct Stage {
    id: StageId,
    profile: RwLock<StageProfile>,
    capabilities: RwLock<Registry<dyn Capability>>,
    resources: RwLock<Registry<dyn Resource>>,
    products: RwLock<Registry<dyn Product>>,
    ledger: Arc<BudgetLedger>,
    behavior: Arc<dyn StageBehavior>,
    gateway: Option<Arc<ReasoningGateway>>,
    poll_interval: Duration,
    inbox: Mutex<Option<StageInbox>>,
    outbox: OnceLock<StageOutbox>,
    state: watch::Sender<StageState>,
    processed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
    dropped: AtomicU64,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("balance", &self.balance())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Stage {
    /// Builds a stage from its spec: creates its ledger and instantiates
    /// every named registry entry through `factories`.
    ///
    /// The stage is `Idle` and unwired.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Registry`] if a named entry has no factory, or
    /// [`PipelineError::Ledger`] if the budget is negative.
    pub fn from_spec(
        spec: &StageSpec,
        factories: &Factories,
        behavior: Arc<dyn StageBehavior>,
        gateway: Option<Arc<ReasoningGateway>>,
        poll_interval: Duration,
    ) -> Result<Self, PipelineError> {
        let ledger = Arc::new(BudgetLedger::new(spec.stage.as_str(), spec.budget)?);
        let ctx = FactoryContext {
            stage: spec.stage,
            ledger: Arc::clone(&ledger) as Arc<dyn Ledger>,
        };

        let mut capabilities = Registry::new(RegistryKind::Capability);
        factories
            .capabilities
            .populate(&spec.capabilities, &ctx, &mut capabilities)?;
        let mut resources = Registry::new(RegistryKind::Resource);
        factories
            .resources
            .populate(&spec.resources, &ctx, &mut resources)?;
        let mut products = Registry::new(RegistryKind::Product);
        factories
            .products
            .populate(&spec.products, &ctx, &mut products)?;

        let (state, _) = watch::channel(StageState::Idle);
        Ok(Self {
            id: spec.stage,
            profile: RwLock::new(spec.profile.clone()),
            capabilities: RwLock::new(capabilities),
            resources: RwLock::new(resources),
            products: RwLock::new(products),
            ledger,
            behavior,
            gateway,
            poll_interval,
            inbox: Mutex::new(None),
            outbox: OnceLock::new(),
            state,
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Hands the stage its queue ends. Allowed once.
    pub(crate) fn connect(&self, inbox: StageInbox, outbox: StageOutbox) -> Result<(), PipelineError> {
        self.outbox
            .set(outbox)
            .map_err(|_| PipelineError::AlreadyWired(self.id))?;
        *self.inbox.lock() = Some(inbox);
        Ok(())
    }

    /// This stage's identity.
    pub fn id(&self) -> StageId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StageState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<StageState> {
        self.state.subscribe()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> StageStats {
        StageStats {
            processed: self.processed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
        }
    }

    /// The stage's ledger.
    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    /// Remaining budget.
    pub fn balance(&self) -> Money {
        self.ledger.balance()
    }

    /// A copy of the current profile.
    pub fn profile(&self) -> StageProfile {
        self.profile.read().clone()
    }

    /// Applies an amendment to the profile, all fields or none.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if any key is not a field of this stage or has the
    /// wrong value shape.
    pub fn amend(&self, amendment: &Amendment) -> Result<(), ConfigError> {
        let mut profile = self.profile.write();
        match profile.amend(amendment) {
            Ok(()) => {
                info!(
                    stage = %self.id,
                    fields = ?amendment.keys().collect::<Vec<_>>(),
                    "Stage configuration amended"
                );
                Ok(())
            }
            Err(e) => {
                warn!(stage = %self.id, error = %e, "Amendment rejected");
                Err(e)
            }
        }
    }

    /// Read access to the capability registry.
    pub fn capabilities(&self) -> RwLockReadGuard<'_, Registry<dyn Capability>> {
        self.capabilities.read()
    }

    /// Write access to the capability registry.
    pub fn capabilities_mut(&self) -> RwLockWriteGuard<'_, Registry<dyn Capability>> {
        self.capabilities.write()
    }

    /// Read access to the resource registry.
    pub fn resources(&self) -> RwLockReadGuard<'_, Registry<dyn Resource>> {
        self.resources.read()
    }

    /// Write access to the resource registry.
    pub fn resources_mut(&self) -> RwLockWriteGuard<'_, Registry<dyn Resource>> {
        self.resources.write()
    }

    /// Read access to the product registry.
    pub fn products(&self) -> RwLockReadGuard<'_, Registry<dyn Product>> {
        self.products.read()
    }

    /// Write access to the product registry.
    pub fn products_mut(&self) -> RwLockWriteGuard<'_, Registry<dyn Product>> {
        self.products.write()
    }

    /// Produces a registered product, checking its requirements against this
    /// stage's registries.
    ///
    /// # Errors
    ///
    /// See [`Registry::execute`].
    pub fn produce(&self, product: &str, context: &str) -> Result<String, RegistryError> {
        let products = self.products.read();
        let capabilities = self.capabilities.read();
        let resources = self.resources.read();
        products.execute(product, &capabilities, &resources, context)
    }

    fn context(&self) -> StageContext {
        let capability_prompts = {
            let registry = self.capabilities.read();
            let mut named: Vec<(String, String)> = registry
                .iter()
                .filter_map(|(name, c)| c.prompt().map(|p| (name.to_string(), p.to_string())))
                .collect();
            named.sort();
            named.into_iter().map(|(_, p)| p).collect()
        };
        StageContext {
            stage: self.id,
            profile: self.profile(),
            capability_prompts,
            ledger: Arc::clone(&self.ledger) as Arc<dyn Ledger>,
            gateway: self.gateway.clone(),
        }
    }

    fn set_state(&self, state: StageState) {
        let previous = self.state.send_replace(state);
        debug!(from = %previous, to = %state, "Stage state changed");
    }

    /// Runs the stage loop until `stop` is cancelled.
    ///
    /// Waits on both inbound queues at once, bounded by the poll interval so
    /// the stop signal is re-checked even when both are idle.
    pub(crate) async fn run(self: Arc<Self>, stop: CancellationToken) {
        let span = info_span!("stage", stage = %self.id);
        self.run_loop(stop).instrument(span).await;
    }

    async fn run_loop(&self, stop: CancellationToken) {
        let taken = self.inbox.lock().take();
        let (Some(mut inbox), Some(outbox)) = (taken, self.outbox.get()) else {
            warn!("Stage started without queues or after a previous run; not running");
            self.set_state(StageState::Stopped);
            return;
        };

        self.set_state(StageState::Running);
        info!("Stage running");

        let mut above_open = true;
        let mut below_open = true;
        loop {
            let (envelope, flow) = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                item = inbox.from_above.recv(), if above_open => match item {
                    Some(envelope) => (envelope, Flow::Downward),
                    None => {
                        debug!("Queue from above closed");
                        above_open = false;
                        continue;
                    }
                },
                item = inbox.from_below.recv(), if below_open => match item {
                    Some(envelope) => (envelope, Flow::Upward),
                    None => {
                        debug!("Queue from below closed");
                        below_open = false;
                        continue;
                    }
                },
                _ = tokio::time::sleep(self.poll_interval) => continue,
            };

            let work = self.handle(envelope, flow, outbox);
            tokio::pin!(work);
            tokio::select! {
                biased;
                _ = &mut work => {}
                _ = stop.cancelled() => {
                    self.set_state(StageState::Draining);
                    info!("Stop observed; finishing the in-flight item");
                    work.await;
                    break;
                }
            }
        }

        if self.state() != StageState::Draining {
            self.set_state(StageState::Draining);
        }
        // Queued items are left unread.
        inbox.from_above.close();
        inbox.from_below.close();
        self.set_state(StageState::Stopped);
        info!(stats = ?self.stats(), "Stage stopped");
    }

    async fn handle(&self, envelope: Envelope, flow: Flow, outbox: &StageOutbox) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        debug!(id = %envelope.id, %flow, origin = %envelope.origin, "Handling envelope");

        if envelope.is_error() {
            // Error reports always travel toward the top, whichever side they
            // arrived from.
            self.send(outbox, Flow::Upward, envelope);
            self.processed.fetch_add(1, Ordering::AcqRel);
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        let ctx = self.context();
        let outcome = AssertUnwindSafe(self.behavior.process(&ctx, envelope, flow))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(StageError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(emits) => {
                for emit in emits {
                    let (direction, value) = match emit {
                        Emit::Up(value) => (Flow::Upward, value),
                        Emit::Down(value) => (Flow::Downward, value),
                    };
                    let envelope = Envelope::payload(Origin::Stage(self.id), value);
                    self.send(outbox, direction, envelope);
                }
                self.processed.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::AcqRel);
                match e.kind() {
                    ErrorKind::Stage | ErrorKind::BillingInvariantViolation => {
                        error!(error = %e, kind = %e.kind(), "Stage behaviour failed")
                    }
                    _ => warn!(error = %e, kind = %e.kind(), "Stage behaviour failed"),
                }
                let report = Envelope::error(self.id, e.kind(), e.to_string());
                self.send(outbox, Flow::Upward, report);
            }
        }

        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Hands an envelope to a neighbour queue without waiting.
    ///
    /// A full queue drops the envelope and counts it. A dropped downward
    /// envelope is reported upward when there is room for the report.
    fn send(&self, outbox: &StageOutbox, flow: Flow, envelope: Envelope) {
        let id = envelope.id;
        match sender_for(outbox, flow).try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                warn!(%id, %flow, "Neighbour queue closed; envelope dropped");
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::AcqRel);
                warn!(%id, %flow, "Neighbour queue full; envelope dropped");
                if flow == Flow::Downward {
                    let report = Envelope::error(
                        self.id,
                        ErrorKind::Stage,
                        format!("queue below {} is full; envelope {id} dropped", self.id),
                    );
                    if outbox.to_above.try_send(report).is_err() {
                        warn!(%id, "No room to report the dropped envelope upward");
                    }
                }
            }
        }
    }
}

fn sender_for(outbox: &StageOutbox, flow: Flow) -> &mpsc::Sender<Envelope> {
    match flow {
        Flow::Downward => &outbox.to_below,
        Flow::Upward => &outbox.to_above,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
