//! The per-stage budget ledger.
//!
//! A ledger holds one depletable, non-negative balance. The only mutation is
//! [`Ledger::debit`], which checks sufficiency and subtracts as a single
//! atomic step. There is no credit operation; a budget is topped up only by
//! constructing a new ledger.

use std::sync::atomic::{AtomicI64, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::ErrorKind;
use crate::types::Money;

/// Errors produced by a [`Ledger`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The requested amount was negative (or an initial balance was negative).
    #[error("Invalid ledger amount {amount}: {reason}")]
    InvalidArgument {
        /// The rejected amount.
        amount: Money,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The balance cannot cover the requested amount. The balance is unchanged.
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount the caller asked to debit.
        requested: Money,
        /// Balance at the moment the debit was rejected.
        available: Money,
    },
}

impl LedgerError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
        }
    }
}

/// A depletable balance that gates spending.
///
/// Implementations must make `debit` atomic with respect to concurrent
/// callers on the same instance: two racing debits can never together take
/// the balance below zero.
pub trait Ledger: Send + Sync {
    /// Current balance. Never negative.
    fn balance(&self) -> Money;

    /// Subtracts `amount` if the balance covers it, returning the new balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidArgument`] if `amount` is negative.
    /// - [`LedgerError::InsufficientFunds`] if `amount` exceeds the balance.
    ///
    /// In both cases the balance is left unchanged.
    fn debit(&self, amount: Money) -> Result<Money, LedgerError>;
}

/// Lock-free [`Ledger`] backed by an atomic micro-dollar balance.
#[derive(Debug)]
pub struct BudgetLedger {
    label: String,
    balance: AtomicI64,
}

impl BudgetLedger {
    /// Creates a ledger with an initial balance.
    ///
    /// `label` is used only in log events (typically the owning stage's name).
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidArgument`] if `initial` is negative.
    pub fn new(label: impl Into<String>, initial: Money) -> Result<Self, LedgerError> {
        if initial.is_negative() {
            return Err(LedgerError::InvalidArgument {
                amount: initial,
                reason: "initial balance must not be negative",
            });
        }
        Ok(Self {
            label: label.into(),
            balance: AtomicI64::new(initial.as_micros()),
        })
    }

    /// The label this ledger reports under.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Ledger for BudgetLedger {
    fn balance(&self) -> Money {
        Money::from_micros(self.balance.load(Ordering::Acquire))
    }

    fn debit(&self, amount: Money) -> Result<Money, LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::InvalidArgument {
                amount,
                reason: "debit amount must not be negative",
            });
        }

        let requested = amount.as_micros();
        let outcome = self
            .balance
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if requested > current {
                    None
                } else {
                    Some(current - requested)
                }
            });

        match outcome {
            Ok(previous) => {
                let remaining = Money::from_micros(previous - requested);
                debug!(
                    ledger = %self.label,
                    amount = %amount,
                    remaining = %remaining,
                    "ledger debited"
                );
                Ok(remaining)
            }
            Err(current) => {
                let available = Money::from_micros(current);
                warn!(
                    ledger = %self.label,
                    requested = %amount,
                    available = %available,
                    "ledger debit rejected: insufficient funds"
                );
                Err(LedgerError::InsufficientFunds {
                    requested: amount,
                    available,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn dollars(d: f64) -> Money {
        Money::from_dollars(d).unwrap()
    }

    #[test]
    fn debit_within_balance_subtracts() {
        let ledger = BudgetLedger::new("test", dollars(1.0)).unwrap();
        let remaining = ledger.debit(dollars(0.25)).unwrap();
        assert_eq!(remaining, dollars(0.75));
        assert_eq!(ledger.balance(), dollars(0.75));
    }

    #[test]
    fn debit_of_exact_balance_reaches_zero() {
        let ledger = BudgetLedger::new("test", dollars(0.5)).unwrap();
        assert_eq!(ledger.debit(dollars(0.5)).unwrap(), Money::ZERO);
        assert_eq!(ledger.balance(), Money::ZERO);
    }

    #[test]
    fn debit_over_balance_fails_without_side_effects() {
        let ledger = BudgetLedger::new("test", dollars(0.05)).unwrap();
        let err = ledger.debit(dollars(0.1)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                requested: dollars(0.1),
                available: dollars(0.05),
            }
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(ledger.balance(), dollars(0.05));
    }

    #[test]
    fn negative_debit_is_invalid_argument() {
        let ledger = BudgetLedger::new("test", dollars(1.0)).unwrap();
        let err = ledger.debit(dollars(-0.01)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(ledger.balance(), dollars(1.0));
    }

    #[test]
    fn zero_debit_succeeds_and_changes_nothing() {
        let ledger = BudgetLedger::new("test", dollars(0.3)).unwrap();
        assert_eq!(ledger.debit(Money::ZERO).unwrap(), dollars(0.3));
    }

    #[test]
    fn negative_initial_balance_is_rejected() {
        let err = BudgetLedger::new("test", dollars(-1.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn property_debit_matches_model_over_many_amounts() {
        // Sweep amounts around the balance, including the boundary.
        for balance_micros in [0_i64, 1, 999, 50_000, 1_000_000] {
            for amount_micros in [0_i64, 1, 998, 999, 1000, 49_999, 50_000, 50_001, 2_000_000] {
                let ledger =
                    BudgetLedger::new("sweep", Money::from_micros(balance_micros)).unwrap();
                let result = ledger.debit(Money::from_micros(amount_micros));
                if amount_micros <= balance_micros {
                    assert_eq!(
                        result.unwrap(),
                        Money::from_micros(balance_micros - amount_micros)
                    );
                    assert_eq!(
                        ledger.balance().as_micros(),
                        balance_micros - amount_micros
                    );
                } else {
                    assert!(result.is_err());
                    assert_eq!(ledger.balance().as_micros(), balance_micros);
                }
            }
        }
    }

    #[test]
    fn concurrent_debits_never_overdraw() {
        let ledger = Arc::new(BudgetLedger::new("race", Money::from_micros(1_000)).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|_| ledger.debit(Money::from_micros(3)).is_ok())
                        .count()
                })
            })
            .collect();

        let successes: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(successes, 333);
        assert_eq!(ledger.balance(), Money::from_micros(1));
    }
}
