//! Shared value types for the ACE pipeline domain.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types carry values
//! with invariants and participate in domain computations: money is exact
//! fixed-point, token counts are non-negative, prices never under-charge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Token counts
// ---------------------------------------------------------------------------

/// Number of tokens in a message sequence or a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this count is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for TokenCount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for TokenCount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

const MICROS_PER_DOLLAR: i64 = 1_000_000;

/// A monetary amount in US dollars, stored as whole micro-dollars.
///
/// Fixed-point so that repeated debits never drift: `1.0 - 0.1 - 0.1` is
/// exactly `0.8`. The type is signed only so that a negative amount can be
/// expressed and then rejected by the ledger; balances themselves never go
/// below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero dollars.
    pub const ZERO: Money = Money(0);

    /// Creates an amount from whole micro-dollars.
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Creates an amount from a dollar value, rounded to the nearest
    /// micro-dollar.
    ///
    /// Returns `None` if `dollars` is NaN, infinite, or out of range.
    #[must_use]
    pub fn from_dollars(dollars: f64) -> Option<Self> {
        if !dollars.is_finite() {
            return None;
        }
        let micros = (dollars * MICROS_PER_DOLLAR as f64).round();
        if micros < i64::MIN as f64 || micros > i64::MAX as f64 {
            return None;
        }
        Some(Self(micros as i64))
    }

    /// Returns the amount in micro-dollars.
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Returns the amount in dollars (for display and reporting only).
    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / MICROS_PER_DOLLAR as f64
    }

    /// Returns `true` if the amount is below zero.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Returns `true` if the amount is exactly zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked subtraction; `None` on overflow.
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Checked addition; `None` on overflow.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub_to_zero(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0).max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MICROS_PER_DOLLAR as u64;
        write!(f, "{sign}${}.{:06}", abs / per, abs % per)
    }
}

impl std::ops::Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

// ---------------------------------------------------------------------------
// Unit prices
// ---------------------------------------------------------------------------

/// Price of one thousand tokens, in micro-dollars.
///
/// Costs are rounded up so a call is never billed below its true price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitPrice(u64);

impl UnitPrice {
    /// Creates a price from micro-dollars per thousand tokens.
    pub const fn from_micros_per_thousand(micros: u64) -> Self {
        Self(micros)
    }

    /// Creates a price from dollars per thousand tokens (the unit providers
    /// publish), rounded to the nearest micro-dollar.
    ///
    /// Returns `None` if `dollars` is negative, NaN, or infinite.
    #[must_use]
    pub fn from_dollars_per_thousand(dollars: f64) -> Option<Self> {
        let money = Money::from_dollars(dollars)?;
        u64::try_from(money.as_micros()).ok().map(Self)
    }

    /// Returns the price in micro-dollars per thousand tokens.
    pub const fn as_micros_per_thousand(self) -> u64 {
        self.0
    }

    /// Cost of `tokens` at this price: `ceil(tokens × price / 1000)`.
    pub fn cost_of(self, tokens: TokenCount) -> Money {
        let scaled = u128::from(tokens.as_u64()) * u128::from(self.0);
        let micros = scaled.div_ceil(1000);
        Money::from_micros(i64::try_from(micros).unwrap_or(i64::MAX))
    }

    /// The largest token count whose cost does not exceed `budget`.
    ///
    /// A free price affords an unbounded number of tokens (`u64::MAX`).
    pub fn affordable_tokens(self, budget: Money) -> TokenCount {
        if self.0 == 0 {
            return TokenCount::new(u64::MAX);
        }
        let budget = u128::try_from(budget.as_micros()).unwrap_or(0);
        let tokens = budget * 1000 / u128::from(self.0);
        TokenCount::new(u64::try_from(tokens).unwrap_or(u64::MAX))
    }
}

impl std::fmt::Display for UnitPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let as_money = Money::from_micros(i64::try_from(self.0).unwrap_or(i64::MAX));
        write!(f, "{as_money}/1k tokens")
    }
}

// ---------------------------------------------------------------------------
// Conversation messages
// ---------------------------------------------------------------------------

/// The author of one message in a reasoning request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// Input supplied by the caller.
    User,
    /// Output produced by the backend.
    Assistant,
}

impl Role {
    /// The wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged text message.
///
/// An ordered sequence of these is the unit billed by the reasoning gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: Role,
    /// Text content.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_is_exact_under_repeated_subtraction() {
        let start = Money::from_dollars(1.0).unwrap();
        let tenth = Money::from_dollars(0.1).unwrap();
        let left = start.checked_sub(tenth).unwrap().checked_sub(tenth).unwrap();
        assert_eq!(left, Money::from_dollars(0.8).unwrap());
        assert_eq!(left.as_micros(), 800_000);
    }

    #[test]
    fn money_rejects_non_finite_dollars() {
        assert!(Money::from_dollars(f64::NAN).is_none());
        assert!(Money::from_dollars(f64::INFINITY).is_none());
        assert!(Money::from_dollars(-0.5).unwrap().is_negative());
    }

    #[test]
    fn money_display_has_six_decimals() {
        assert_eq!(Money::from_micros(1_500_000).to_string(), "$1.500000");
        assert_eq!(Money::from_micros(-250).to_string(), "-$0.000250");
    }

    #[test]
    fn unit_price_rounds_cost_up() {
        // $0.0015 per 1k tokens = 1500 micro-dollars per 1k.
        let price = UnitPrice::from_dollars_per_thousand(0.0015).unwrap();
        assert_eq!(price.as_micros_per_thousand(), 1500);
        // 1 token costs 1.5 micro-dollars, billed as 2.
        assert_eq!(price.cost_of(TokenCount::new(1)), Money::from_micros(2));
        assert_eq!(price.cost_of(TokenCount::new(1000)), Money::from_micros(1500));
    }

    #[test]
    fn affordable_tokens_never_exceed_budget() {
        let price = UnitPrice::from_micros_per_thousand(3000);
        let budget = Money::from_micros(10_000);
        let tokens = price.affordable_tokens(budget);
        assert_eq!(tokens.as_u64(), 3333);
        assert!(price.cost_of(tokens) <= budget);
        assert!(price.cost_of(TokenCount::new(tokens.as_u64() + 1)) > budget);
    }

    #[test]
    fn negative_prices_are_rejected() {
        assert!(UnitPrice::from_dollars_per_thousand(-0.01).is_none());
    }
}
