// Rust guideline compliant 2026-10-18

//! In-memory adapter for the `UserDirectory` port.
//!
//! Intended for demo runs and tests. State is lost on exit.

use domain::{DirectoryError, User, UserDirectory};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct Inner {
    /// Members by full name.
    users: BTreeMap<String, User>,
    /// Loyalty id to full name.
    by_loyalty_id: HashMap<String, String>,
}

impl Inner {
    fn upsert(&mut self, user: User) {
        if let Some(previous) = self.users.get(user.full_name())
            && let Some(old_id) = previous.loyalty_id()
            && previous.loyalty_id() != user.loyalty_id()
        {
            self.by_loyalty_id.remove(old_id);
        }
        if let Some(id) = user.loyalty_id() {
            self.by_loyalty_id.insert(id.to_owned(), user.full_name().to_owned());
        }
        self.users.insert(user.full_name().to_owned(), user);
    }
}

/// `UserDirectory` adapter holding members in a map keyed by full name, with
/// a loyalty-id index kept in step on every save.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RefCell<Inner>,
}

impl InMemoryDirectory {
    /// Directory holding `users`. Later duplicates of a full name win.
    #[must_use]
    pub fn new(users: Vec<User>) -> Self {
        let directory = Self::default();
        {
            let mut inner = directory.inner.borrow_mut();
            for user in users {
                inner.upsert(user);
            }
        }
        directory
    }

    /// Snapshot of a member by full name.
    #[cfg(test)]
    #[must_use]
    pub fn get(&self, full_name: &str) -> Option<User> {
        self.inner.borrow().users.get(full_name).cloned()
    }
}

impl UserDirectory for InMemoryDirectory {
    async fn get_by_loyalty_id(&self, loyalty_id: &str) -> Result<Option<User>, DirectoryError> {
        let inner = self.inner.borrow();
        Ok(inner
            .by_loyalty_id
            .get(loyalty_id)
            .and_then(|name| inner.users.get(name))
            .cloned())
    }

    /// Store every user in one step; readers never see a partial batch.
    async fn save_all(&self, users: &[User]) -> Result<(), DirectoryError> {
        let mut inner = self.inner.borrow_mut();
        for user in users {
            inner.upsert(user.clone());
        }
        tracing::debug!(count = users.len(), "in_memory_directory.saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
