//! # Account Ledger
//!
//! Single-currency account balances for an escrow deployment. The ledger
//! is the money side of a sale: earnest deposits, lender contributions,
//! seller proceeds, and buyer refunds all move through it.
//!
//! Balances are plain `u64` amounts in the smallest currency unit, one
//! balance per address. Accounts appear on first credit; an address with
//! no entry simply has a zero balance. Journaling and multi-currency
//! support are out of scope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Attempted to transfer nothing. A zero-amount movement is always a
    /// caller bug, so it is rejected instead of silently succeeding.
    #[error("zero amount: transfers must move at least one unit")]
    ZeroAmount,

    /// Attempted to debit more than the available balance.
    #[error("insufficient funds: account {account:?} has {available}, requested {requested}")]
    InsufficientFunds {
        /// The account being debited.
        account: Address,
        /// The balance it actually holds.
        available: u64,
        /// The amount that was requested.
        requested: u64,
    },

    /// Arithmetic overflow during a credit operation.
    ///
    /// All circulating funds sum well below `u64::MAX`, so hitting this
    /// means corrupted input rather than a real holding.
    #[error("balance overflow: account {account:?} holds {current}, credit {credit}")]
    Overflow {
        /// The account being credited.
        account: Address,
        /// Its balance before the failed credit.
        current: u64,
        /// The amount that caused the overflow.
        credit: u64,
    },
}

// ---------------------------------------------------------------------------
// AccountLedger
// ---------------------------------------------------------------------------

/// The set of account balances known to a deployment.
///
/// Internally a `HashMap<Address, u64>`. Provides credit/debit/transfer
/// operations that enforce non-negative balances and overflow protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLedger {
    /// Balances indexed by account address.
    #[serde(with = "crate::identity::address_map")]
    accounts: HashMap<Address, u64>,
}

impl AccountLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }

    /// Credits (adds) funds to an account, creating it if needed.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Overflow`] if the credit would exceed
    /// `u64::MAX`.
    pub fn credit(&mut self, account: Address, amount: u64) -> Result<u64, LedgerError> {
        let balance = self.accounts.entry(account).or_insert(0);
        let new_balance = balance.checked_add(amount).ok_or(LedgerError::Overflow {
            account,
            current: *balance,
            credit: amount,
        })?;
        *balance = new_balance;
        Ok(new_balance)
    }

    /// Debits (subtracts) funds from an account.
    ///
    /// Returns the remaining balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] if the debit exceeds the
    /// current balance. An account with no entry holds zero.
    pub fn debit(&mut self, account: Address, amount: u64) -> Result<u64, LedgerError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account,
                available,
                requested: amount,
            });
        }

        let remaining = available - amount;
        self.accounts.insert(account, remaining);
        Ok(remaining)
    }

    /// Moves `amount` from one account to another.
    ///
    /// Validates everything before touching either balance: a failed
    /// transfer leaves the ledger exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ZeroAmount`] for a zero `amount`,
    /// [`LedgerError::InsufficientFunds`] if `from` cannot cover it, and
    /// [`LedgerError::Overflow`] if crediting `to` would overflow.
    pub fn transfer(&mut self, from: Address, to: Address, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account: from,
                available,
                requested: amount,
            });
        }

        // A self-transfer moves nothing, but still demands a covered amount.
        if from == to {
            return Ok(());
        }

        let current = self.balance_of(to);
        let credited = current.checked_add(amount).ok_or(LedgerError::Overflow {
            account: to,
            current,
            credit: amount,
        })?;

        self.accounts.insert(from, available - amount);
        self.accounts.insert(to, credited);
        Ok(())
    }

    /// Returns the balance of `account`, or 0 if it has no entry.
    pub fn balance_of(&self, account: Address) -> u64 {
        self.accounts.get(&account).copied().unwrap_or(0)
    }

    /// Returns all non-zero balances as `(Address, amount)` pairs.
    pub fn all_balances(&self) -> Vec<(Address, u64)> {
        self.accounts
            .iter()
            .filter(|(_, &amount)| amount != 0)
            .map(|(account, &amount)| (*account, amount))
            .collect()
    }

    /// Returns the number of accounts with an entry (including zeros).
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Returns the sum of every balance on the ledger.
    ///
    /// Accumulated as `u128` so the total cannot itself overflow.
    pub fn total_in_circulation(&self) -> u128 {
        self.accounts.values().map(|&amount| amount as u128).sum()
    }
}

impl Default for AccountLedger {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
