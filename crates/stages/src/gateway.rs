//! The reasoning gateway: every external reasoning call goes through here.
//!
//! One call is:
//!
//! 1. choose a tier from the ledger balance;
//! 2. price the request and refuse before any backend call if the balance
//!    cannot cover it plus the shortest possible reply;
//! 3. cap the reply length to what the remaining balance can pay for;
//! 4. call the backend (the only suspending step);
//! 5. price the reply and debit input + output in one ledger operation.
//!
//! A backend failure never debits. A reply whose actual cost the ledger
//! refuses is reported as [`GatewayError::BillingInvariantViolation`] and is
//! not returned: the ledger stays as it was and the text is dropped.

use std::sync::Arc;

use ace_core::{
    BackendError, ChatMessage, CompletionRequest, ConfigError, CostEstimate, ErrorKind,
    GatewaySettings, Ledger, LedgerError, ModelId, Money, PriceDirection, PriceTable,
    PricingError, ReasoningBackend, TierName, TierPolicy, TierSpec, TokenCount, TokenCounter,
    UnitPrice,
};
use thiserror::Error;
use tracing::{debug, error, info_span, warn, Instrument};

/// Errors returned by [`ReasoningGateway::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The balance cannot cover the priced request. No backend call was made.
    #[error("Insufficient funds for reasoning call: request costs {required}, balance is {available}")]
    InsufficientFunds {
        /// Priced cost of the request.
        required: Money,
        /// Balance at the time of the check.
        available: Money,
    },

    /// The backend call failed. The ledger was not touched.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The tier could not be priced or counted.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// The actual cost of a completed call exceeded what the balance could
    /// cover. The ledger was not debited and the reply was discarded.
    #[error(
        "Billing invariant violated: reserved {reserved} before the call, actual cost {actual}, balance {available}"
    )]
    BillingInvariantViolation {
        /// Input cost checked before the call.
        reserved: Money,
        /// Input + output cost after the call.
        actual: Money,
        /// Balance when the debit was refused.
        available: Money,
    },

    /// The ledger rejected the debit for a reason other than funds.
    #[error(transparent)]
    Ledger(LedgerError),
}

impl GatewayError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            GatewayError::Backend(e) => e.kind(),
            GatewayError::Pricing(e) => e.kind(),
            GatewayError::BillingInvariantViolation { .. } => ErrorKind::BillingInvariantViolation,
            GatewayError::Ledger(e) => e.kind(),
        }
    }
}

/// A billed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// The backend's reply text.
    pub text: String,
    /// Tier the call ran on.
    pub tier: TierName,
    /// Model the call ran on.
    pub model: ModelId,
    /// Priced request.
    pub input: CostEstimate,
    /// Priced reply.
    pub output: CostEstimate,
    /// Amount debited.
    pub total: Money,
    /// Ledger balance after the debit.
    pub remaining: Money,
}

/// Meters external reasoning calls against a caller-supplied ledger.
///
/// Holds no per-call state; one instance is shared by every stage.
pub struct ReasoningGateway {
    backend: Arc<dyn ReasoningBackend>,
    policy: TierPolicy,
    prices: PriceTable,
    counter: Arc<dyn TokenCounter>,
}

impl std::fmt::Debug for ReasoningGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningGateway")
            .field("backend", &self.backend.name())
            .field("policy", &self.policy)
            .field("prices", &self.prices)
            .finish_non_exhaustive()
    }
}

impl ReasoningGateway {
    /// Creates a gateway.
    ///
    /// # Errors
    ///
    /// [`PricingError::UnknownTier`] if either tier of `policy` has no price.
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        policy: TierPolicy,
        prices: PriceTable,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, PricingError> {
        prices.covers(&policy)?;
        Ok(Self {
            backend,
            policy,
            prices,
            counter,
        })
    }

    /// Creates a gateway from settings, using the heuristic token counter.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the settings do not resolve.
    pub fn from_settings(
        backend: Arc<dyn ReasoningBackend>,
        settings: &GatewaySettings,
    ) -> Result<Self, ConfigError> {
        let (policy, prices) = settings.resolve()?;
        Self::new(backend, policy, prices, Arc::new(settings.counter))
            .map_err(|e| ConfigError::invalid(e.to_string()))
    }

    /// The tier policy.
    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// Name of the backend, for logs.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Runs one metered reasoning call.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InsufficientFunds`] before any backend call if the
    ///   balance cannot pay for the request and a one-token reply.
    /// - [`GatewayError::Backend`], unchanged, if the call fails. No debit.
    /// - [`GatewayError::BillingInvariantViolation`] if the combined cost is
    ///   refused by the ledger. No debit.
    /// - [`GatewayError::Pricing`] if the tier cannot be priced or counted.
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        ledger: &dyn Ledger,
    ) -> Result<Reply, GatewayError> {
        let balance = ledger.balance();
        let tier = self.policy.choose_tier(balance);
        let span = info_span!("reasoning_call", tier = %tier.name, model = %tier.model);
        self.call(tier, balance, messages, ledger)
            .instrument(span)
            .await
    }

    async fn call(
        &self,
        tier: &TierSpec,
        balance: Money,
        messages: &[ChatMessage],
        ledger: &dyn Ledger,
    ) -> Result<Reply, GatewayError> {
        let input_tokens = self.counter.count(messages, tier)?;
        let input = self
            .prices
            .estimate(tier, PriceDirection::Input, input_tokens)?;

        if balance < input.amount {
            warn!(
                required = %input.amount,
                available = %balance,
                "Reasoning call refused before backend invocation"
            );
            return Err(GatewayError::InsufficientFunds {
                required: input.amount,
                available: balance,
            });
        }

        let after_input = balance.saturating_sub_to_zero(input.amount);
        let output_price = self.prices.price(&tier.name, PriceDirection::Output)?;
        // Framing tokens of an empty reply are billed on top of the content.
        let framing = self.counter.count(&[ChatMessage::assistant("")], tier)?;
        let shortest_reply = output_price.cost_of(framing + TokenCount::new(1));
        if after_input < shortest_reply {
            let required = input.amount + shortest_reply;
            warn!(
                required = %required,
                available = %balance,
                "Reasoning call refused: no room for a reply"
            );
            return Err(GatewayError::InsufficientFunds {
                required,
                available: balance,
            });
        }

        let max_tokens = output_cap(tier, output_price, framing, after_input);
        let request = CompletionRequest {
            model: tier.model.clone(),
            messages: messages.to_vec(),
            max_tokens: Some(max_tokens),
        };

        debug!(
            backend = self.backend.name(),
            input_tokens = input_tokens.as_u64(),
            max_tokens,
            "Invoking reasoning backend"
        );
        let text = self.backend.complete(&request).await?;

        let output_tokens = self
            .counter
            .count(&[ChatMessage::assistant(text.as_str())], tier)?;
        let output = self
            .prices
            .estimate(tier, PriceDirection::Output, output_tokens)?;
        let total = input.amount + output.amount;

        let remaining = match ledger.debit(total) {
            Ok(remaining) => remaining,
            Err(LedgerError::InsufficientFunds { available, .. }) => {
                error!(
                    reserved = %input.amount,
                    actual = %total,
                    available = %available,
                    output_tokens = output_tokens.as_u64(),
                    "Actual cost of reasoning call exceeds balance; reply discarded"
                );
                return Err(GatewayError::BillingInvariantViolation {
                    reserved: input.amount,
                    actual: total,
                    available,
                });
            }
            Err(e) => return Err(GatewayError::Ledger(e)),
        };

        debug!(cost = %total, remaining = %remaining, "Reasoning call billed");
        Ok(Reply {
            text,
            tier: tier.name.clone(),
            model: tier.model.clone(),
            input,
            output,
            total,
            remaining,
        })
    }

}

/// Longest reply the balance left after the request can pay for, bounded by
/// the tier limit. Callers have already checked that one token is affordable.
fn output_cap(tier: &TierSpec, price: UnitPrice, framing: TokenCount, after_input: Money) -> u32 {
    let content = price
        .affordable_tokens(after_input)
        .as_u64()
        .saturating_sub(framing.as_u64());
    let cap = content.min(u64::from(tier.max_output_tokens)).max(1);
    u32::try_from(cap).unwrap_or(tier.max_output_tokens)
}
