// Rust guideline compliant 2026-10-18

//! Point-of-sale receipts and the visits derived from them.

use crate::{Timestamp, User};

/// One point-of-sale transaction as reported by the loyalty ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Ledger-assigned receipt number.
    pub receipt_number: String,
    /// Loyalty customer the sale was attributed to; `None` for walk-in sales.
    pub customer_id: Option<String>,
    /// Creation time in the business's local offset.
    pub created_at: Timestamp,
}

/// A receipt attributed to a known member. Lives for a single update cycle.
#[derive(Debug, Clone)]
pub struct RawVisit {
    /// The member as the directory knew them when the cycle started.
    pub user: User,
    /// Receipt creation time, in the business offset.
    pub at: Timestamp,
}

impl RawVisit {
    /// Visit by `user` at `at`.
    #[must_use]
    pub fn new(user: User, at: Timestamp) -> Self {
        Self { user, at }
    }
}
