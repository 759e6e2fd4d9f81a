// Rust guideline compliant 2026-10-18

//! Shared domain types for the visit-rewards bot.
//!
//! Defines [`Points`], [`User`], [`Receipt`], the port error enums, and the
//! hexagonal port traits: [`ReceiptSource`], [`UserDirectory`], [`Ledger`],
//! [`Messenger`] and [`Clock`]. Every other crate depends on this one; it
//! imports none of them.

mod clock;
mod points;
mod receipt;
mod user;

pub use clock::{Clock, SystemClock};
pub use points::{Points, PointsError};
pub use receipt::{RawVisit, Receipt};
pub use user::{UnknownRole, User, UserRole};

/// Instant in the business's local UTC offset. Calendar months are taken from
/// the local date.
pub type Timestamp = chrono::DateTime<chrono::FixedOffset>;

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Errors from the [`ReceiptSource`] port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiptError {
    /// The receipt window could not be read completely.
    #[error("receipt fetch failed: {reason}")]
    FetchFailed {
        /// Human-readable description.
        reason: String,
    },
    /// The source kept returning cursors past the configured page bound.
    #[error("receipt fetch exceeded {max_pages} page(s)")]
    TooManyPages { max_pages: usize },
}

/// Errors from the [`UserDirectory`] port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// The backing store could not be reached.
    #[error("user directory unavailable: {reason}")]
    Unavailable {
        /// Human-readable description.
        reason: String,
    },
    /// A stored record could not be decoded.
    #[error("corrupt user record: {reason}")]
    Corrupt {
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the [`Ledger`] port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// A debit exceeds the customer's balance.
    #[error("insufficient points")]
    InsufficientFunds,
    /// The user has no loyalty account.
    #[error("{name} has no loyalty account")]
    InvalidCustomer {
        /// Full name of the user.
        name: String,
    },
    /// The resulting balance would be out of range.
    #[error("balance out of range: {0}")]
    OutOfRange(#[from] PointsError),
    /// The ledger could not be reached.
    #[error("ledger unavailable: {reason}")]
    Unavailable {
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the [`Messenger`] port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessengerError {
    /// The message could not be delivered.
    #[error("delivery failed: {reason}")]
    DeliveryFailed {
        /// Human-readable description.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Hexagonal port: point-of-sale receipts.
///
/// Implementations must return every receipt created since `since`; order is
/// approximately chronological but callers sort before use.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait ReceiptSource {
    /// All receipts created strictly after `since`.
    ///
    /// A receipt stamped exactly at `since` belongs to the previous window.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError`] when the window cannot be read completely.
    async fn receipts_since(&self, since: Timestamp) -> Result<Vec<Receipt>, ReceiptError>;
}

/// Hexagonal port: member lookup and persistence.
///
/// Implementations own any derived indexes and must never let a reader
/// observe a partially saved batch.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait UserDirectory {
    /// Resolve a loyalty customer id. Unknown ids yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the store cannot be read.
    async fn get_by_loyalty_id(&self, loyalty_id: &str) -> Result<Option<User>, DirectoryError>;

    /// Upsert every user, keyed by full name.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the batch cannot be written.
    async fn save_all(&self, users: &[User]) -> Result<(), DirectoryError>;
}

/// Hexagonal port: the loyalty points ledger.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait Ledger {
    /// Current balance of `user`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidCustomer`] when the user has no account.
    async fn balance(&self, user: &User) -> Result<Points, LedgerError>;

    /// Credit `points` to `user`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidCustomer`] when the user has no account,
    /// [`LedgerError::OutOfRange`] when the balance would overflow, or
    /// [`LedgerError::Unavailable`] on transport failure.
    async fn grant_points(&self, user: &User, points: Points) -> Result<(), LedgerError>;

    /// Debit `points` from `user`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] when the balance is too low.
    async fn deduct_points(&self, user: &User, points: Points) -> Result<(), LedgerError>;
}

/// Hexagonal port: outbound chat messages. Best-effort.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait Messenger {
    /// Send `text` to a private chat.
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::DeliveryFailed`] when the message is not delivered.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), MessengerError>;
}
