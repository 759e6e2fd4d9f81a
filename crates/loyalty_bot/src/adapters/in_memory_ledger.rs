// Rust guideline compliant 2026-10-18

//! In-memory adapter for the `Ledger` port.
//!
//! Accounts are keyed by loyalty id and must be opened before points can be
//! granted. Intended for demo runs and tests.

use domain::{Ledger, LedgerError, Points, User};
use std::cell::RefCell;
use std::collections::HashMap;

/// `Ledger` adapter holding one balance per loyalty account.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: RefCell<HashMap<String, Points>>,
}

impl InMemoryLedger {
    /// Ledger with a zero-balance account for each id.
    #[must_use]
    pub fn with_accounts<'a>(loyalty_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let accounts = loyalty_ids.into_iter().map(|id| (id.to_owned(), Points::ZERO)).collect();
        Self { accounts: RefCell::new(accounts) }
    }

    fn account_key(user: &User) -> Result<&str, LedgerError> {
        user.loyalty_id().ok_or_else(|| LedgerError::InvalidCustomer {
            name: user.full_name().to_owned(),
        })
    }

    fn update(
        &self,
        user: &User,
        apply: impl FnOnce(Points) -> Result<Points, LedgerError>,
    ) -> Result<(), LedgerError> {
        let key = Self::account_key(user)?;
        let mut accounts = self.accounts.borrow_mut();
        let balance = accounts.get_mut(key).ok_or_else(|| LedgerError::InvalidCustomer {
            name: user.full_name().to_owned(),
        })?;
        *balance = apply(*balance)?;
        Ok(())
    }
}

impl Ledger for InMemoryLedger {
    async fn balance(&self, user: &User) -> Result<Points, LedgerError> {
        let key = Self::account_key(user)?;
        self.accounts
            .borrow()
            .get(key)
            .copied()
            .ok_or_else(|| LedgerError::InvalidCustomer { name: user.full_name().to_owned() })
    }

    async fn grant_points(&self, user: &User, points: Points) -> Result<(), LedgerError> {
        self.update(user, |balance| Ok(balance.checked_add(points)?))?;
        tracing::info!(user = user.full_name(), %points, "in_memory_ledger.granted");
        Ok(())
    }

    async fn deduct_points(&self, user: &User, points: Points) -> Result<(), LedgerError> {
        self.update(user, |balance| {
            if balance < points {
                return Err(LedgerError::InsufficientFunds);
            }
            Ok(balance.checked_sub(points)?)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
