//! Backend tiers, price tables, and token counting.
//!
//! Cost of a reasoning call is always derived the same way:
//! `price(tier, direction) × count(messages, tier)`. The gateway evaluates it
//! twice per call, once for the request and once for the reply.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ErrorKind;
use crate::identifiers::{ModelId, TierName};
use crate::types::{ChatMessage, Money, TokenCount, UnitPrice};

/// Errors produced while pricing or counting a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// No price is configured for the tier. Pricing fails closed: an unknown
    /// tier is never treated as free.
    #[error("No price configured for tier '{0}'")]
    UnknownTier(TierName),

    /// The token counter could not handle the request.
    #[error("Token counting failed for tier '{tier}': {reason}")]
    Counting {
        /// Tier the count was requested for.
        tier: TierName,
        /// Counter-specific reason.
        reason: String,
    },
}

impl PricingError {
    /// The taxonomy kind of this error. Always [`ErrorKind::InvalidArgument`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// A named backend capability/cost class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    /// Key into the [`PriceTable`].
    pub name: TierName,
    /// Model identifier sent to the backend.
    pub model: ModelId,
    /// Upper bound on reply length requested from the backend.
    pub max_output_tokens: u32,
}

/// Two-tier selection driven by the remaining balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    threshold: Money,
    premium: TierSpec,
    economy: TierSpec,
}

impl TierPolicy {
    /// Creates a policy: balances strictly above `threshold` use `premium`.
    pub fn new(threshold: Money, premium: TierSpec, economy: TierSpec) -> Self {
        Self {
            threshold,
            premium,
            economy,
        }
    }

    /// Selects the tier for a call made against `balance`.
    ///
    /// Pure: the same balance always yields the same tier.
    pub fn choose_tier(&self, balance: Money) -> &TierSpec {
        if balance > self.threshold {
            &self.premium
        } else {
            &self.economy
        }
    }

    /// The balance above which the premium tier is used.
    pub fn threshold(&self) -> Money {
        self.threshold
    }

    /// Both tiers, premium first.
    pub fn tiers(&self) -> [&TierSpec; 2] {
        [&self.premium, &self.economy]
    }
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

/// Which side of a call is being priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    /// The request sent to the backend.
    Input,
    /// The reply received from the backend.
    Output,
}

impl std::fmt::Display for PriceDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceDirection::Input => f.write_str("input"),
            PriceDirection::Output => f.write_str("output"),
        }
    }
}

/// Input and output prices for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPrice {
    /// Price of request tokens.
    pub input: UnitPrice,
    /// Price of reply tokens.
    pub output: UnitPrice,
}

/// Lookup of `(tier, direction) → unit price`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceTable {
    prices: HashMap<TierName, TierPrice>,
}

impl PriceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or replaces) the prices for a tier.
    pub fn insert(&mut self, tier: TierName, price: TierPrice) -> Option<TierPrice> {
        self.prices.insert(tier, price)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, tier: TierName, price: TierPrice) -> Self {
        self.prices.insert(tier, price);
        self
    }

    /// Unit price for a tier and direction.
    ///
    /// # Errors
    ///
    /// [`PricingError::UnknownTier`] if the tier has no entry.
    pub fn price(&self, tier: &TierName, direction: PriceDirection) -> Result<UnitPrice, PricingError> {
        let entry = self
            .prices
            .get(tier)
            .ok_or_else(|| PricingError::UnknownTier(tier.clone()))?;
        Ok(match direction {
            PriceDirection::Input => entry.input,
            PriceDirection::Output => entry.output,
        })
    }

    /// Prices `tokens` in `direction` on `tier`.
    ///
    /// # Errors
    ///
    /// [`PricingError::UnknownTier`] if the tier has no entry.
    pub fn estimate(
        &self,
        tier: &TierSpec,
        direction: PriceDirection,
        tokens: TokenCount,
    ) -> Result<CostEstimate, PricingError> {
        let unit_price = self.price(&tier.name, direction)?;
        Ok(CostEstimate {
            tier: tier.name.clone(),
            direction,
            tokens,
            unit_price,
            amount: unit_price.cost_of(tokens),
        })
    }

    /// Checks that every tier of `policy` has a price.
    ///
    /// # Errors
    ///
    /// [`PricingError::UnknownTier`] naming the first unpriced tier.
    pub fn covers(&self, policy: &TierPolicy) -> Result<(), PricingError> {
        for tier in policy.tiers() {
            if !self.prices.contains_key(&tier.name) {
                return Err(PricingError::UnknownTier(tier.name.clone()));
            }
        }
        Ok(())
    }
}

/// The priced cost of one side of a reasoning call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Tier the price came from.
    pub tier: TierName,
    /// Request or reply.
    pub direction: PriceDirection,
    /// Counted tokens.
    pub tokens: TokenCount,
    /// Price per thousand tokens.
    pub unit_price: UnitPrice,
    /// `unit_price × tokens`, rounded up.
    pub amount: Money,
}

// ---------------------------------------------------------------------------
// Token counting
// ---------------------------------------------------------------------------

/// Counts the tokens a message sequence will consume on a tier.
///
/// Contract: deterministic for identical input, and non-decreasing as message
/// content grows.
pub trait TokenCounter: Send + Sync {
    /// Counts tokens for `messages` as billed on `tier`.
    ///
    /// # Errors
    ///
    /// [`PricingError::Counting`] if the counter cannot handle the tier.
    fn count(&self, messages: &[ChatMessage], tier: &TierSpec) -> Result<TokenCount, PricingError>;
}

/// Character-based token estimate with chat-format overheads.
///
/// Each message costs `tokens_per_message` plus its role and content at
/// `chars_per_token` characters per token (rounded up); every sequence is
/// primed with `reply_priming` tokens for the assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicTokenCounter {
    /// Characters treated as one token.
    pub chars_per_token: u32,
    /// Fixed framing cost per message.
    pub tokens_per_message: u32,
    /// Fixed cost of priming the reply.
    pub reply_priming: u32,
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            tokens_per_message: 3,
            reply_priming: 3,
        }
    }
}

impl HeuristicTokenCounter {
    fn text_tokens(&self, text: &str) -> u64 {
        let chars = text.chars().count() as u64;
        chars.div_ceil(u64::from(self.chars_per_token.max(1)))
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, messages: &[ChatMessage], _tier: &TierSpec) -> Result<TokenCount, PricingError> {
        let body: u64 = messages
            .iter()
            .map(|m| {
                u64::from(self.tokens_per_message)
                    + self.text_tokens(m.role.as_str())
                    + self.text_tokens(&m.content)
            })
            .sum();
        Ok(TokenCount::new(body + u64::from(self.reply_priming)))
    }
}
