// Rust guideline compliant 2026-10-18

//! Visit accounting: turns raw point-of-sale visits into monthly visit counts
//! and the reward checkpoints newly crossed in each month.
//!
//! Entry points: [`VisitCalculator::add_visits`],
//! [`VisitCalculator::next_checkpoint`], [`VisitCalculator::get_visits_this_month`].
//! Configuration via [`VisitCalculator::builder`].
//!
//! The calculator is pure. It never mutates the users it is given; every
//! update is a fresh copy returned in a [`VisitUpdate`].

use chrono::{Datelike as _, FixedOffset, NaiveDate, NaiveTime, TimeDelta};
use domain::{Points, RawVisit, Timestamp, User};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

/// Checkpoint visit count to reward.
pub type Checkpoints = BTreeMap<u32, Points>;

/// First day of a calendar month to the checkpoints newly crossed in it.
pub type ReachedCheckpoints = BTreeMap<NaiveDate, Checkpoints>;

/// Visits closer together than this count once (one checkout, several receipts).
pub const DEFAULT_COLLAPSE_WINDOW: TimeDelta = TimeDelta::hours(8);

/// Time of day assumed for a visit recorded without one.
pub const DEFAULT_VISIT_TIME: NaiveTime = match NaiveTime::from_hms_opt(19, 0, 0) {
    Some(time) => time,
    None => panic!("19:00 is a valid time"),
};

// ---------------------------------------------------------------------------
// VisitError
// ---------------------------------------------------------------------------

/// Errors raised while configuring the calculator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VisitError {
    /// The checkpoint table is malformed.
    #[error("invalid checkpoint table: {reason}")]
    InvalidCheckpoint {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The calculator configuration is invalid.
    #[error("invalid visit calculator configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Month helpers
// ---------------------------------------------------------------------------

/// First day of the local calendar month containing `at`.
#[must_use]
pub fn month_of(at: &Timestamp) -> NaiveDate {
    let date = at.date_naive();
    date.with_day(1).unwrap_or(date)
}

/// First instant of the local calendar month containing `at`, same offset.
#[must_use]
pub fn start_of_month(at: &Timestamp) -> Timestamp {
    visit_timestamp(month_of(at), Some(NaiveTime::MIN), DEFAULT_VISIT_TIME, *at.offset())
}

/// Timestamp for a visit on `date`, falling back to `default_time` when the
/// time of day is unknown.
#[must_use]
pub fn visit_timestamp(
    date: NaiveDate,
    time: Option<NaiveTime>,
    default_time: NaiveTime,
    offset: FixedOffset,
) -> Timestamp {
    let local = date.and_time(time.unwrap_or(default_time));
    let utc = local - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    Timestamp::from_naive_utc_and_offset(utc, offset)
}

// ---------------------------------------------------------------------------
// CheckpointTable
// ---------------------------------------------------------------------------

/// Ascending, immutable mapping from visit count to reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointTable(Checkpoints);

impl CheckpointTable {
    /// Build a table from `(visits, reward)` pairs in any order.
    ///
    /// # Errors
    ///
    /// Returns [`VisitError::InvalidCheckpoint`] for a zero checkpoint, a
    /// checkpoint listed twice, or rewards too large to be summed.
    pub fn new(entries: impl IntoIterator<Item = (u32, Points)>) -> Result<Self, VisitError> {
        let mut table = Checkpoints::new();
        for (visits, reward) in entries {
            if visits == 0 {
                return Err(VisitError::InvalidCheckpoint {
                    reason: "checkpoints must be at least 1 visit".to_owned(),
                });
            }
            if table.insert(visits, reward).is_some() {
                return Err(VisitError::InvalidCheckpoint {
                    reason: format!("checkpoint {visits} is listed more than once"),
                });
            }
        }
        // Any month's total lies between these two sums.
        for sign in [Points::is_positive, Points::is_negative] {
            let same_sign: Vec<Points> = table.values().copied().filter(|reward| sign(*reward)).collect();
            Points::checked_sum(&same_sign).map_err(|error| VisitError::InvalidCheckpoint {
                reason: format!("rewards cannot be totalled: {error}"),
            })?;
        }
        Ok(Self(table))
    }

    /// Smallest checkpoint strictly above `visits`.
    #[must_use]
    pub fn next_after(&self, visits: u32) -> Option<(u32, Points)> {
        self.0
            .range((Excluded(visits), Unbounded))
            .next()
            .map(|(checkpoint, reward)| (*checkpoint, *reward))
    }

    /// Checkpoints `c` with `start < c <= end`.
    #[must_use]
    pub fn crossed(&self, start: u32, end: u32) -> Checkpoints {
        if end <= start {
            return Checkpoints::new();
        }
        self.0
            .range((Excluded(start), Included(end)))
            .map(|(checkpoint, reward)| (*checkpoint, *reward))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// VisitCalculator + builder
// ---------------------------------------------------------------------------

/// One user's outcome from a batch of visits.
#[derive(Debug, Clone)]
pub struct VisitUpdate {
    /// Updated copy of the user.
    pub user: User,
    /// Checkpoints newly crossed, by month. Empty when none were crossed.
    pub reached: ReachedCheckpoints,
}

/// Builder for [`VisitCalculator`].
///
/// Obtain via [`VisitCalculator::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct VisitCalculatorBuilder {
    checkpoints: CheckpointTable,
    collapse_window: TimeDelta,
}

impl VisitCalculatorBuilder {
    /// Override the window within which receipts collapse into one visit.
    #[must_use]
    pub fn collapse_window(mut self, window: TimeDelta) -> Self {
        self.collapse_window = window;
        self
    }

    /// Validate and build the calculator.
    ///
    /// # Errors
    ///
    /// Returns [`VisitError::InvalidConfig`] when the collapse window is not positive.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<VisitCalculator, VisitError> {
        if self.collapse_window <= TimeDelta::zero() {
            return Err(VisitError::InvalidConfig {
                reason: "collapse window must be positive".to_owned(),
            });
        }
        Ok(VisitCalculator {
            checkpoints: self.checkpoints,
            collapse_window: self.collapse_window,
        })
    }
}

/// Computes monthly visit counts and checkpoint crossings.
///
/// Holds only the immutable checkpoint table and collapse window, so it can
/// be shared freely and needs no locking.
#[derive(Debug, Clone)]
pub struct VisitCalculator {
    checkpoints: CheckpointTable,
    collapse_window: TimeDelta,
}

impl VisitCalculator {
    /// Calculator with the default 8-hour collapse window.
    #[must_use]
    pub fn new(checkpoints: CheckpointTable) -> Self {
        Self { checkpoints, collapse_window: DEFAULT_COLLAPSE_WINDOW }
    }

    /// Create a builder. The checkpoint table is the only required parameter.
    #[must_use]
    pub fn builder(checkpoints: CheckpointTable) -> VisitCalculatorBuilder {
        VisitCalculatorBuilder { checkpoints, collapse_window: DEFAULT_COLLAPSE_WINDOW }
    }

    /// Receipts closer together than this count as one visit.
    #[must_use]
    pub fn collapse_window(&self) -> TimeDelta {
        self.collapse_window
    }

    /// Visits `user` has made in the month of `now`.
    ///
    /// Returns 0 when `recent_visits` belongs to an earlier month, i.e. no
    /// visit has been recorded yet this month.
    #[must_use]
    pub fn get_visits_this_month(user: &User, now: &Timestamp) -> u32 {
        match user.last_visit() {
            Some(last) if month_of(&last) >= month_of(now) => user.recent_visits(),
            _ => 0,
        }
    }

    /// The next checkpoint after `visits_so_far` and its reward, or `None`
    /// once the highest checkpoint has been reached.
    #[must_use]
    pub fn next_checkpoint(&self, visits_so_far: u32) -> Option<(u32, Points)> {
        self.checkpoints.next_after(visits_so_far)
    }

    /// Apply a batch of raw visits spanning any number of users.
    ///
    /// Visits are grouped by user identity (full name); the first occurrence
    /// of a user supplies its prior state. Users whose visits are all stale or
    /// collapsed away are omitted. Results are ordered by full name.
    #[must_use]
    pub fn add_visits(&self, raw_visits: &[RawVisit], current_time: Timestamp) -> Vec<VisitUpdate> {
        let mut by_user: BTreeMap<&str, (&User, Vec<Timestamp>)> = BTreeMap::new();
        for visit in raw_visits {
            by_user
                .entry(visit.user.full_name())
                .or_insert_with(|| (&visit.user, vec![]))
                .1
                .push(visit.at);
        }

        by_user
            .into_values()
            .filter_map(|(user, visits)| self.add_user_visits(user, &visits, current_time))
            .collect()
    }

    /// Apply `visits` to a single user.
    ///
    /// Returns `None` when no visit survives deduplication.
    #[must_use]
    pub fn add_user_visits(
        &self,
        user: &User,
        visits: &[Timestamp],
        current_time: Timestamp,
    ) -> Option<VisitUpdate> {
        let distinct = self.distinct_visits(visits, user.last_visit());
        let latest = *distinct.last()?;

        // Counts are per month. The stored count only seeds the month of the
        // stored last visit; any other month starts from zero.
        let mut totals: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        if let Some(last) = user.last_visit() {
            totals.insert(month_of(&last), user.recent_visits());
        }

        let mut reached = ReachedCheckpoints::new();
        for (month, count) in count_by_month(&distinct) {
            let old_count = totals.get(&month).copied().unwrap_or(0);
            let new_count = old_count.saturating_add(count);
            totals.insert(month, new_count);

            let crossed = self.checkpoints.crossed(old_count, new_count);
            if !crossed.is_empty() {
                reached.insert(month, crossed);
            }
        }

        let recent_visits = totals.get(&month_of(&current_time)).copied().unwrap_or(0);
        tracing::debug!(
            user = user.full_name(),
            new_visits = distinct.len(),
            recent_visits,
            months_rewarded = reached.len(),
            "visit_calculator.user.updated"
        );

        Some(VisitUpdate { user: user.with_visits(recent_visits, Some(latest)), reached })
    }

    /// Drop visits at or before `last_visit`, sort, and collapse visits that
    /// fall within the collapse window of the previous counted visit.
    fn distinct_visits(&self, visits: &[Timestamp], last_visit: Option<Timestamp>) -> Vec<Timestamp> {
        let mut fresh: Vec<Timestamp> = visits
            .iter()
            .copied()
            .filter(|visit| last_visit.is_none_or(|last| *visit > last))
            .collect();
        fresh.sort_unstable();

        let Some(first) = fresh.first().copied() else {
            return vec![];
        };

        let mut next_allowed = last_visit.map_or(first, |last| last + self.collapse_window);
        let mut distinct = Vec::with_capacity(fresh.len());
        for visit in fresh {
            if visit >= next_allowed {
                distinct.push(visit);
                next_allowed = visit + self.collapse_window;
            }
        }
        distinct
    }
}

/// Visit count per month, ascending.
fn count_by_month(visits: &[Timestamp]) -> BTreeMap<NaiveDate, u32> {
    let mut counts = BTreeMap::new();
    for visit in visits {
        *counts.entry(month_of(visit)).or_insert(0) += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
