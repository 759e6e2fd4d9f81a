// Rust guideline compliant 2026-10-18

//! Wall-clock port.

use crate::Timestamp;
use chrono::{FixedOffset, Utc};

/// Source of "now". Injected so update cycles can be tested at fixed instants.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Reads the system clock and expresses it in the business's UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Clock reporting times in `offset`.
    #[must_use]
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().with_timezone(&self.offset)
    }
}
