//! The event-sourced wallet aggregate.

use common::UserId;

use crate::error::{DomainError, Result};
use crate::event::{Event, EventPayload};
use crate::money::Money;

/// A user's wallet, rebuilt by folding the user's event stream.
///
/// A wallet comes into existence implicitly with the first event for its
/// user id and is never deleted. The fold is total: events outside the
/// funds family leave the wallet untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    user_id: UserId,
    balance: Money,
    available_balance: Money,
    version: u64,
}

impl Wallet {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            balance: Money::ZERO,
            available_balance: Money::ZERO,
            version: 0,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn available_balance(&self) -> Money {
        self.available_balance
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Applies one event. Pure and infallible: events record balances that
    /// were already computed when they were emitted.
    pub fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::FundsDebited(data) => {
                self.balance = data.new_balance;
                self.available_balance = data.new_balance;
                self.version += 1;
            }
            EventPayload::FundsCredited(data) => {
                self.balance = data.new_balance;
                self.available_balance = data.new_balance;
                self.version += 1;
            }
            // FundsInsufficient records a refusal, not a balance change.
            _ => {}
        }
    }

    /// Rebuilds a wallet from the user's event stream.
    pub fn fold(user_id: UserId, events: &[Event]) -> Wallet {
        let mut wallet = Wallet::new(user_id);
        for event in events {
            wallet.apply(event);
        }
        wallet
    }

    /// Returns true if `amount` can be debited right now.
    pub fn can_debit(&self, amount: Money) -> bool {
        amount.is_positive() && self.available_balance >= amount
    }

    /// Validates a debit, distinguishing bad input from a business refusal.
    pub fn validate_debit(&self, amount: Money) -> Result<()> {
        if !amount.is_positive() {
            return Err(DomainError::NonPositiveAmount(amount));
        }
        if self.available_balance < amount {
            return Err(DomainError::InsufficientFunds {
                requested: amount,
                available: self.available_balance,
            });
        }
        Ok(())
    }
}
