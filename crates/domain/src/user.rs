// Rust guideline compliant 2026-10-18

//! Community member records.
//!
//! A [`User`] is an immutable value. Visit accounting never mutates a user in
//! place; it derives a new copy through the `with_*` functions and hands that
//! copy to the directory for persistence.

use crate::Timestamp;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Membership role. Staff visits are counted but never rewarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Champion,
    Staff,
}

impl UserRole {
    /// Whether checkpoint rewards may be granted to this role.
    #[must_use]
    pub fn can_earn_points(self) -> bool {
        self != Self::Staff
    }

    /// Lowercase name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Champion => "champion",
            Self::Staff => "staff",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored role name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown user role: {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "champion" => Ok(Self::Champion),
            "staff" => Ok(Self::Staff),
            _ => Err(UnknownRole(s.to_owned())),
        }
    }
}

/// A community member.
///
/// Identity is the full name: equality and hashing ignore every other field,
/// so an updated copy of a user still matches the original.
///
/// `recent_visits` is only meaningful for the calendar month that contains
/// `last_visit`; read it through the visit calculator's month-aware helper.
#[derive(Debug, Clone)]
pub struct User {
    full_name: String,
    aliases: Vec<String>,
    chat_username: Option<String>,
    chat_id: Option<i64>,
    loyalty_id: Option<String>,
    role: UserRole,
    recent_visits: u32,
    last_visit: Option<Timestamp>,
}

impl User {
    /// A champion with no aliases, accounts, or visits.
    #[must_use]
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            aliases: vec![],
            chat_username: None,
            chat_id: None,
            loyalty_id: None,
            role: UserRole::Champion,
            recent_visits: 0,
            last_visit: None,
        }
    }

    /// Replace the nicknames. The first is the preferred one.
    #[must_use]
    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Set the chat handle.
    #[must_use]
    pub fn with_chat_username(mut self, username: impl Into<String>) -> Self {
        self.chat_username = Some(username.into());
        self
    }

    /// Set the private chat channel.
    #[must_use]
    pub fn with_chat_id(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    /// Link the point-of-sale customer account.
    #[must_use]
    pub fn with_loyalty_id(mut self, loyalty_id: impl Into<String>) -> Self {
        self.loyalty_id = Some(loyalty_id.into());
        self
    }

    /// Set the membership role.
    #[must_use]
    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    /// Copy of `self` carrying new visit accounting fields.
    #[must_use]
    pub fn with_visits(&self, recent_visits: u32, last_visit: Option<Timestamp>) -> Self {
        Self { recent_visits, last_visit, ..self.clone() }
    }

    /// Unique identity key.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// First word of the full name, used to address the member when no
    /// alias is set.
    #[must_use]
    pub fn first_name(&self) -> &str {
        self.full_name.split_whitespace().next().unwrap_or(&self.full_name)
    }

    /// Nicknames, preferred first.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// The preferred nickname, if any. Takes precedence over [`first_name`](Self::first_name).
    #[must_use]
    pub fn main_alias(&self) -> Option<&str> {
        self.aliases.first().map(String::as_str)
    }

    /// Chat handle, if known.
    #[must_use]
    pub fn chat_username(&self) -> Option<&str> {
        self.chat_username.as_deref()
    }

    /// Private chat channel, when the member has started a conversation with the bot.
    #[must_use]
    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    /// Point-of-sale customer id, if linked.
    #[must_use]
    pub fn loyalty_id(&self) -> Option<&str> {
        self.loyalty_id.as_deref()
    }

    /// Membership role.
    #[must_use]
    pub fn role(&self) -> UserRole {
        self.role
    }

    /// Visits counted in the month of [`last_visit`](Self::last_visit).
    #[must_use]
    pub fn recent_visits(&self) -> u32 {
        self.recent_visits
    }

    /// Most recent counted visit.
    #[must_use]
    pub fn last_visit(&self) -> Option<Timestamp> {
        self.last_visit
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_name.hash(state);
    }
}
