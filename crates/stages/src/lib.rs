//! Runtime for the six-stage cognitive pipeline.
//!
//! This crate wires the stages together with bounded queues, runs one Tokio
//! task per stage, and meters every reasoning call through the shared
//! [`ReasoningGateway`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Stages sequence calls between the domain types in
//! `ace-core` and the [`ace_core::ReasoningBackend`] port. Which backend is
//! used is decided by the binary.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`queue`] | Inter-stage channels and the external [`PipelineIo`] |
//! | [`gateway`] | [`ReasoningGateway`]: tier choice, pricing, billing |
//! | [`behavior`] | [`StageBehavior`] and the built-in behaviours |
//! | [`stage`] | [`Stage`] state machine and run loop |
//! | [`pipeline`] | [`PipelineBuilder`] and [`Pipeline`] lifecycle |

pub mod behavior;
pub mod gateway;
pub mod pipeline;
pub mod queue;
pub mod stage;

pub use behavior::{DeliberativeBehavior, Emit, RelayBehavior, StageBehavior, StageContext, StageError};
pub use gateway::{GatewayError, ReasoningGateway, Reply};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError};
pub use queue::{Boundary, PipelineIo, StageInbox, StageOutbox};
pub use stage::{Stage, StageState, StageStats};
