//! Per-stage named-entity registries and the factory tables that fill them.
//!
//! Every stage owns three registries: capabilities (what it can do),
//! resources (what it can draw on), and products (what it can produce). Each
//! is a plain name-keyed map where the last write wins.
//!
//! Entries are never synthesised at runtime. A [`FactoryTable`] maps names to
//! constructors registered in code; stage configuration names the entries it
//! wants and the pipeline instantiates them when it builds the stage.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::errors::ErrorKind;
use crate::identifiers::{EntryName, StageId};
use crate::ledger::Ledger;
use crate::types::Money;

/// Errors produced by registries, factories, and registry entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No constructor is registered under the name.
    #[error("No {kind} factory named '{name}'")]
    UnknownFactory {
        /// Which registry the lookup was for.
        kind: RegistryKind,
        /// The requested name.
        name: String,
    },

    /// No entry is registered under the name.
    #[error("No {kind} named '{name}' is registered")]
    UnknownEntry {
        /// Which registry the lookup was for.
        kind: RegistryKind,
        /// The requested name.
        name: String,
    },

    /// A product cannot be produced because a requirement is not registered.
    #[error("Product '{product}' requires {kind} '{requirement}', which is not registered")]
    MissingRequirement {
        /// The product being executed.
        product: EntryName,
        /// Registry the requirement should live in.
        kind: RegistryKind,
        /// The missing entry.
        requirement: EntryName,
    },

    /// A capacity resource was asked to go above capacity or below zero.
    #[error("Resource '{resource}': {reason}")]
    Capacity {
        /// The resource.
        resource: EntryName,
        /// What was wrong with the request.
        reason: String,
    },
}

impl RegistryError {
    /// The taxonomy kind of this error. Always [`ErrorKind::InvalidArgument`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

/// Which of the three per-stage registries something belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    /// Capability registry.
    Capability,
    /// Resource registry.
    Resource,
    /// Product registry.
    Product,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryKind::Capability => f.write_str("capability"),
            RegistryKind::Resource => f.write_str("resource"),
            RegistryKind::Product => f.write_str("product"),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry traits
// ---------------------------------------------------------------------------

/// Something a stage knows how to do.
pub trait Capability: Send + Sync + fmt::Debug {
    /// Registry key.
    fn name(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str;

    /// Instruction text this capability contributes to the stage's reasoning
    /// context, if any.
    fn prompt(&self) -> Option<&str> {
        None
    }
}

/// Current level of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLevel {
    /// A countable resource with a fixed capacity.
    Units {
        /// Total capacity.
        capacity: u64,
        /// Amount currently in use.
        used: u64,
    },
    /// A monetary resource.
    Funds(Money),
}

/// Something a stage can draw on.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Registry key.
    fn name(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str;

    /// Current level.
    fn level(&self) -> ResourceLevel;
}

/// Something a stage can produce once its requirements are met.
pub trait Product: Send + Sync + fmt::Debug {
    /// Registry key.
    fn name(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str;

    /// Resources that must be registered before the product can be produced.
    fn required_resources(&self) -> &[EntryName] {
        &[]
    }

    /// Capabilities that must be registered before the product can be produced.
    fn required_capabilities(&self) -> &[EntryName] {
        &[]
    }

    /// Produces the product from `context`.
    ///
    /// # Errors
    ///
    /// Product-specific.
    fn produce(&self, context: &str) -> Result<String, RegistryError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A name-keyed map of shared entries.
///
/// Insertion order is not preserved; a duplicate name replaces the earlier
/// entry.
pub struct Registry<T: ?Sized> {
    kind: RegistryKind,
    entries: HashMap<EntryName, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Creates an empty registry.
    pub fn new(kind: RegistryKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Which registry this is.
    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    /// Adds an entry, returning the one it replaced (if any).
    pub fn add(&mut self, name: EntryName, entry: Arc<T>) -> Option<Arc<T>> {
        self.entries.insert(name, entry)
    }

    /// Removes an entry, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Arc<T>> {
        let key = EntryName::new(name)?;
        self.entries.remove(&key)
    }

    /// Looks an entry up by name.
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        let key = EntryName::new(name)?;
        self.entries.get(&key).cloned()
    }

    /// Looks an entry up by name, reporting absence as an error.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownEntry`] if nothing is registered under `name`.
    pub fn require(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.get(name).ok_or_else(|| RegistryError::UnknownEntry {
            kind: self.kind,
            name: name.to_string(),
        })
    }

    /// Returns `true` if an entry is registered under `name`.
    pub fn contains(&self, name: &EntryName) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<EntryName> {
        let mut names: Vec<EntryName> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Iterates over all entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntryName, &Arc<T>)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

impl Registry<dyn Product> {
    /// Produces the named product after checking that every resource and
    /// capability it requires is registered.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownEntry`] if no such product is registered.
    /// - [`RegistryError::MissingRequirement`] naming the first unmet requirement.
    pub fn execute(
        &self,
        name: &str,
        capabilities: &Registry<dyn Capability>,
        resources: &Registry<dyn Resource>,
        context: &str,
    ) -> Result<String, RegistryError> {
        let product = self.require(name)?;
        let product_name = || EntryName::new(name).unwrap_or_else(|| EntryName::from_literal("product"));

        if let Some(missing) = product
            .required_resources()
            .iter()
            .find(|r| !resources.contains(r))
        {
            return Err(RegistryError::MissingRequirement {
                product: product_name(),
                kind: RegistryKind::Resource,
                requirement: missing.clone(),
            });
        }
        if let Some(missing) = product
            .required_capabilities()
            .iter()
            .find(|c| !capabilities.contains(c))
        {
            return Err(RegistryError::MissingRequirement {
                product: product_name(),
                kind: RegistryKind::Capability,
                requirement: missing.clone(),
            });
        }

        product.produce(context)
    }
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// What a factory can see when it builds an entry for a stage.
#[derive(Clone)]
pub struct FactoryContext {
    /// The stage the entry is being built for.
    pub stage: StageId,
    /// That stage's budget ledger.
    pub ledger: Arc<dyn Ledger>,
}

type Constructor<T> = Box<dyn Fn(&FactoryContext) -> Arc<T> + Send + Sync>;

/// Name → constructor table used to instantiate registry entries from
/// configuration.
pub struct FactoryTable<T: ?Sized> {
    kind: RegistryKind,
    constructors: HashMap<EntryName, Constructor<T>>,
}

impl<T: ?Sized> FactoryTable<T> {
    /// Creates an empty table.
    pub fn new(kind: RegistryKind) -> Self {
        Self {
            kind,
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor, replacing any earlier one under the same name.
    pub fn register<F>(&mut self, name: EntryName, constructor: F) -> &mut Self
    where
        F: Fn(&FactoryContext) -> Arc<T> + Send + Sync + 'static,
    {
        self.constructors.insert(name, Box::new(constructor));
        self
    }

    /// Returns `true` if a constructor is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        EntryName::new(name).is_some_and(|n| self.constructors.contains_key(&n))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<EntryName> {
        let mut names: Vec<EntryName> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Builds the entry registered under `name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownFactory`] if nothing is registered under `name`.
    pub fn build(&self, name: &str, ctx: &FactoryContext) -> Result<Arc<T>, RegistryError> {
        EntryName::new(name)
            .and_then(|n| self.constructors.get(&n))
            .map(|ctor| ctor(ctx))
            .ok_or_else(|| RegistryError::UnknownFactory {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    /// Builds every named entry into `registry`.
    ///
    /// # Errors
    ///
    /// The first [`RegistryError::UnknownFactory`]; entries built before the
    /// failure remain registered.
    pub fn populate(
        &self,
        names: &[EntryName],
        ctx: &FactoryContext,
        registry: &mut Registry<T>,
    ) -> Result<(), RegistryError> {
        for name in names {
            let entry = self.build(name.as_str(), ctx)?;
            registry.add(name.clone(), entry);
        }
        Ok(())
    }
}

impl<T: ?Sized> fmt::Debug for FactoryTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryTable")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

/// The three factory tables a pipeline draws registry entries from.
#[derive(Debug)]
pub struct Factories {
    /// Capability constructors.
    pub capabilities: FactoryTable<dyn Capability>,
    /// Resource constructors.
    pub resources: FactoryTable<dyn Resource>,
    /// Product constructors.
    pub products: FactoryTable<dyn Product>,
}

impl Factories {
    /// Empty tables.
    pub fn empty() -> Self {
        Self {
            capabilities: FactoryTable::new(RegistryKind::Capability),
            resources: FactoryTable::new(RegistryKind::Resource),
            products: FactoryTable::new(RegistryKind::Product),
        }
    }

    /// Tables pre-loaded with the built-in entries.
    pub fn builtin() -> Self {
        let mut factories = Self::empty();

        factories
            .capabilities
            .register(builtin_name("ethical_decision_making"), |_| {
                Arc::new(PromptCapability::new(
                    "ethical_decision_making",
                    "Perform basic ethical checks on proposed actions.",
                    "Before acting, check the proposed action against the mission and values. \
                     Refuse or flag anything that conflicts with them.",
                ))
            })
            .register(builtin_name("initial_assessment"), |_| {
                Arc::new(PromptCapability::new(
                    "initial_assessment",
                    "Assess an incoming request before planning.",
                    "Start by stating the goal of the request, its constraints, and what is still unknown.",
                ))
            });

        factories
            .resources
            .register(builtin_name("currency"), |ctx| {
                Arc::new(CurrencyResource::new(Arc::clone(&ctx.ledger)))
            });

        factories
            .products
            .register(builtin_name("status_report"), |ctx| {
                Arc::new(TemplateProduct::new(
                    "status_report",
                    "A plain-text status report from one stage.",
                    format!("Status report from the {} stage:\n{{context}}", ctx.stage),
                    vec![builtin_name("currency")],
                    Vec::new(),
                ))
            });

        factories
    }
}

impl Default for Factories {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_name(name: &'static str) -> EntryName {
    EntryName::from_literal(name)
}

// ---------------------------------------------------------------------------
// Built-in entries
// ---------------------------------------------------------------------------

/// A capability that contributes a fixed instruction to the reasoning context.
#[derive(Debug, Clone)]
pub struct PromptCapability {
    name: String,
    description: String,
    prompt: String,
}

impl PromptCapability {
    /// Creates a prompt capability.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prompt: prompt.into(),
        }
    }
}

impl Capability for PromptCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn prompt(&self) -> Option<&str> {
        Some(&self.prompt)
    }
}

/// A countable resource with a fixed capacity.
#[derive(Debug)]
pub struct CapacityResource {
    name: EntryName,
    description: String,
    capacity: u64,
    used: AtomicU64,
}

impl CapacityResource {
    /// Creates a resource with nothing in use.
    pub fn new(name: EntryName, description: impl Into<String>, capacity: u64) -> Self {
        Self {
            name,
            description: description.into(),
            capacity,
            used: AtomicU64::new(0),
        }
    }

    /// Takes `amount` units.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Capacity`] if that would exceed capacity; nothing is
    /// taken.
    pub fn acquire(&self, amount: u64) -> Result<u64, RegistryError> {
        let capacity = self.capacity;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(amount).filter(|n| *n <= capacity)
            })
            .map(|prev| capacity - (prev + amount))
            .map_err(|used| RegistryError::Capacity {
                resource: self.name.clone(),
                reason: format!("cannot use {amount}: {used} of {capacity} already in use"),
            })
    }

    /// Returns `amount` units.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Capacity`] if more would be released than is in use.
    pub fn release(&self, amount: u64) -> Result<u64, RegistryError> {
        let capacity = self.capacity;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| used.checked_sub(amount))
            .map(|prev| capacity - (prev - amount))
            .map_err(|used| RegistryError::Capacity {
                resource: self.name.clone(),
                reason: format!("cannot release {amount}: only {used} in use"),
            })
    }

    /// Units still available.
    pub fn remaining(&self) -> u64 {
        self.capacity - self.used.load(Ordering::Acquire)
    }
}

impl Resource for CapacityResource {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn level(&self) -> ResourceLevel {
        ResourceLevel::Units {
            capacity: self.capacity,
            used: self.used.load(Ordering::Acquire),
        }
    }
}

/// Exposes a stage's budget ledger as a resource.
pub struct CurrencyResource {
    ledger: Arc<dyn Ledger>,
}

impl CurrencyResource {
    /// Wraps a ledger.
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }
}

impl fmt::Debug for CurrencyResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrencyResource")
            .field("balance", &self.ledger.balance())
            .finish()
    }
}

impl Resource for CurrencyResource {
    fn name(&self) -> &str {
        "currency"
    }

    fn description(&self) -> &str {
        "Real-world currency available for reasoning calls"
    }

    fn level(&self) -> ResourceLevel {
        ResourceLevel::Funds(self.ledger.balance())
    }
}

/// A product rendered by substituting `{context}` into a template.
#[derive(Debug, Clone)]
pub struct TemplateProduct {
    name: String,
    description: String,
    template: String,
    required_resources: Vec<EntryName>,
    required_capabilities: Vec<EntryName>,
}

impl TemplateProduct {
    /// Creates a template product.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        template: impl Into<String>,
        required_resources: Vec<EntryName>,
        required_capabilities: Vec<EntryName>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            template: template.into(),
            required_resources,
            required_capabilities,
        }
    }
}

impl Product for TemplateProduct {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn required_resources(&self) -> &[EntryName] {
        &self.required_resources
    }

    fn required_capabilities(&self) -> &[EntryName] {
        &self.required_capabilities
    }

    fn produce(&self, context: &str) -> Result<String, RegistryError> {
        Ok(self.template.replace("{context}", context))
    }
}
