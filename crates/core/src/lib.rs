//! Core domain for the layered cognitive pipeline.
//!
//! This crate contains every domain concept, identifier, money and pricing
//! primitive, and error type shared by the pipeline. Infrastructure crates
//! implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no network I/O.
//! It defines *what* is needed; `ace-llm` supplies a reasoning backend and
//! `ace-stages` runs the stages.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `StageId`, `MessageId`, `EntryName`, `TierName`, `ModelId` |
//! | [`types`] | `Money`, `UnitPrice`, `TokenCount`, `ChatMessage`, `Timestamp` |
//! | [`errors`] | `ErrorKind` taxonomy, configuration errors |
//! | [`ledger`] | `Ledger` trait and the atomic `BudgetLedger` |
//! | [`pricing`] | Tiers, price table, token counting |
//! | [`ports`] | `ReasoningBackend` port |
//! | [`registry`] | Capability / resource / product registries and factories |
//! | [`config`] | Stage profiles, amendments, pipeline and gateway settings |
//! | [`message`] | `Envelope` and its body |

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod ledger;
pub mod message;
pub mod ports;
pub mod pricing;
pub mod registry;
pub mod types;

pub use config::{
    Amendment, ConfigValue, GatewaySettings, PipelineSettings, StageProfile, StageSection, StageSpec,
    StagesConfig,
};
pub use errors::{ConfigError, ErrorKind, InvalidStageId};
pub use identifiers::{EntryName, MessageId, ModelId, StageId, TierName};
pub use ledger::{BudgetLedger, Ledger, LedgerError};
pub use message::{Body, Envelope, ErrorReport, Flow, Origin};
pub use ports::{BackendError, CompletionRequest, ReasoningBackend};
pub use pricing::{
    CostEstimate, HeuristicTokenCounter, PriceDirection, PriceTable, PricingError, TierPolicy,
    TierPrice, TierSpec, TokenCounter,
};
pub use registry::{
    Capability, Factories, FactoryContext, FactoryTable, Product, Registry, RegistryError,
    RegistryKind, Resource, ResourceLevel,
};
pub use types::{ChatMessage, Money, Role, TokenCount, Timestamp, UnitPrice};
