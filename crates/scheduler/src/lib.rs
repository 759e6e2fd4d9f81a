// Rust guideline compliant 2026-10-18

//! Visit update scheduler -- periodically pulls new receipts, turns them into
//! visits, persists the updated members, grants checkpoint rewards and
//! notifies the members who earned them.
//!
//! Entry points: [`VisitUpdater::update_once`], [`VisitUpdater::run`].
//! Configuration via [`VisitUpdaterConfig::builder`].

use chrono::NaiveDate;
use domain::{
    Clock, DirectoryError, Ledger, LedgerError, Messenger, MessengerError, Points, RawVisit,
    Receipt, ReceiptError, ReceiptSource, Timestamp, User, UserDirectory,
};
use notifier::{Notifier, NotifierConfig, NotifierError};
use std::cell::Cell;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use visits::{VisitCalculator, VisitUpdate, start_of_month};

// ---------------------------------------------------------------------------
// UpdaterError
// ---------------------------------------------------------------------------

/// Errors that abort an update cycle. The watermark is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    /// The supplied configuration is invalid.
    #[error("invalid visit updater configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// Receipts could not be fetched.
    #[error("receipt fetch error: {0}")]
    Fetch(#[from] ReceiptError),
    /// A member lookup or the batched save failed.
    #[error("user directory error: {0}")]
    Directory(#[from] DirectoryError),
}

// ---------------------------------------------------------------------------
// VisitUpdaterConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`VisitUpdater`].
///
/// Construct via [`VisitUpdaterConfig::builder`].
#[derive(Debug)]
pub struct VisitUpdaterConfig {
    /// Delay between cycle starts.
    pub interval: Duration,
    /// Whether a cycle runs immediately when [`VisitUpdater::run`] starts.
    pub run_on_start: bool,
    /// Optional upper bound on the number of cycles. `None` means infinite.
    pub iterations: Option<u64>,
    /// Optional RNG seed for reward message choice. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Builder for [`VisitUpdaterConfig`].
///
/// Obtain via [`VisitUpdaterConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct VisitUpdaterConfigBuilder {
    interval: Duration,
    run_on_start: bool,
    iterations: Option<u64>,
    seed: Option<u64>,
}

impl VisitUpdaterConfig {
    /// Create a builder.
    ///
    /// Default values: `interval = 5 min`, `run_on_start = true`,
    /// `iterations = None`, `seed = None`.
    #[must_use]
    pub fn builder() -> VisitUpdaterConfigBuilder {
        VisitUpdaterConfigBuilder {
            interval: Duration::from_secs(5 * 60),
            run_on_start: true,
            iterations: None,
            seed: None,
        }
    }
}

impl VisitUpdaterConfigBuilder {
    /// Override the delay between cycle starts.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Skip the immediate cycle at start; the first cycle runs after one interval.
    #[must_use]
    pub fn run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Set a finite cycle count. Without this the updater runs until cancelled.
    #[must_use]
    pub fn iterations(mut self, n: u64) -> Self {
        self.iterations = Some(n);
        self
    }

    /// Fix the RNG seed for deterministic message choice (useful in tests).
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::InvalidConfig`] when `interval` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<VisitUpdaterConfig, UpdaterError> {
        if self.interval.is_zero() {
            return Err(UpdaterError::InvalidConfig {
                reason: "interval must be greater than zero".to_owned(),
            });
        }
        Ok(VisitUpdaterConfig {
            interval: self.interval,
            run_on_start: self.run_on_start,
            iterations: self.iterations,
            seed: self.seed,
        })
    }
}

// ---------------------------------------------------------------------------
// Cycle reports
// ---------------------------------------------------------------------------

/// A reward credited to a member's ledger account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Full name of the member.
    pub user: String,
    /// First day of the month the visits were made in.
    pub month: NaiveDate,
    /// Sum of the checkpoint rewards crossed that month.
    pub points: Points,
}

/// A reward the ledger refused. Not retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantFailure {
    /// Full name of the member.
    pub user: String,
    /// First day of the month the visits were made in.
    pub month: NaiveDate,
    /// Points that were not credited.
    pub points: Points,
    /// Why the ledger refused.
    pub error: LedgerError,
}

/// A month whose reward could not be worked out. Nothing was granted.
#[derive(Debug)]
pub struct RewardFailure {
    /// Full name of the member.
    pub user: String,
    /// First day of the month the visits were made in.
    pub month: NaiveDate,
    /// Why the reward could not be formatted.
    pub error: NotifierError,
}

/// What one completed cycle did.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Receipts attributed to a known member.
    pub raw_visits: usize,
    /// Members whose visit state changed and was saved.
    pub updated_users: usize,
    /// Rewards credited to the ledger.
    pub grants: Vec<Grant>,
    /// Rewards the ledger refused.
    pub failed_grants: Vec<GrantFailure>,
    /// Months whose reward could not be worked out.
    pub failed_rewards: Vec<RewardFailure>,
    /// Reward messages delivered.
    pub notifications: usize,
    /// Reward messages that could not be delivered.
    pub failed_notifications: Vec<MessengerError>,
}

/// Result of a call to [`VisitUpdater::update_once`].
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was still in flight; nothing was done.
    Skipped,
}

/// Marks a cycle as in flight until dropped.
struct InFlight<'a>(&'a Cell<bool>);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) { None } else { Some(Self(flag)) }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

// ---------------------------------------------------------------------------
// VisitUpdater
// ---------------------------------------------------------------------------

/// Drives visit updates from a receipt source to the directory, ledger and
/// messenger ports.
///
/// Generic over the clock; the four data ports are injected per call.
#[derive(Debug)]
pub struct VisitUpdater<C> {
    config: VisitUpdaterConfig,
    calculator: VisitCalculator,
    notifier: Notifier,
    clock: C,
    /// Receipts created after this instant have not been processed yet.
    watermark: Cell<Timestamp>,
    in_flight: Cell<bool>,
}

impl<C: Clock> VisitUpdater<C> {
    /// Create an updater whose watermark starts at the first instant of the
    /// current month, so visits already made this month are counted.
    ///
    /// Reward messages use the default pools, seeded from `config.seed`.
    #[must_use]
    pub fn new(config: VisitUpdaterConfig, calculator: VisitCalculator, clock: C) -> Self {
        let notifier_config = NotifierConfig {
            pools: notifier::default_pools(),
            seed: config.seed,
        };
        Self::with_notifier(config, calculator, Notifier::new(notifier_config), clock)
    }

    /// Like [`new`](Self::new) with a caller-configured notifier.
    #[must_use]
    pub fn with_notifier(
        config: VisitUpdaterConfig,
        calculator: VisitCalculator,
        notifier: Notifier,
        clock: C,
    ) -> Self {
        let watermark = start_of_month(&clock.now());
        tracing::info!(%watermark, "visit_updater.created");
        Self {
            config,
            calculator,
            notifier,
            clock,
            watermark: Cell::new(watermark),
            in_flight: Cell::new(false),
        }
    }

    /// Receipts created at or before this instant have been processed.
    #[must_use]
    pub fn watermark(&self) -> Timestamp {
        self.watermark.get()
    }

    /// The calculator applied to each batch.
    #[must_use]
    pub fn calculator(&self) -> &VisitCalculator {
        &self.calculator
    }

    /// Run one update cycle.
    ///
    /// Ledger and messenger failures are collected in the report and never
    /// abort the cycle. The watermark advances to the cycle's start time only
    /// when the cycle completes.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::Fetch`] when receipts cannot be fetched and
    /// [`UpdaterError::Directory`] when a lookup or the batched save fails.
    pub async fn update_once<S, D, L, M>(
        &self,
        source: &S,
        directory: &D,
        ledger: &L,
        messenger: &M,
    ) -> Result<CycleOutcome, UpdaterError>
    where
        S: ReceiptSource,
        D: UserDirectory,
        L: Ledger,
        M: Messenger,
    {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::info!("visit_updater.cycle.skipped: previous cycle still running");
            return Ok(CycleOutcome::Skipped);
        };

        let now = self.clock.now();
        let since = self.watermark.get();
        let receipts = source.receipts_since(since).await?;
        tracing::debug!(count = receipts.len(), %since, "visit_updater.receipts.fetched");

        let raw_visits = Self::resolve_visits(&receipts, directory, &now).await?;
        let updates = self.calculator.add_visits(&raw_visits, now);

        if !updates.is_empty() {
            let users: Vec<User> = updates.iter().map(|update| update.user.clone()).collect();
            directory.save_all(&users).await?;
        }

        let mut report = CycleReport {
            raw_visits: raw_visits.len(),
            updated_users: updates.len(),
            ..CycleReport::default()
        };
        for update in &updates {
            self.reward(update, &now, ledger, messenger, &mut report).await;
        }

        self.watermark.set(now);
        tracing::info!(
            raw_visits = report.raw_visits,
            updated_users = report.updated_users,
            grants = report.grants.len(),
            failed_grants = report.failed_grants.len(),
            failed_rewards = report.failed_rewards.len(),
            notifications = report.notifications,
            "visit_updater.cycle.completed"
        );
        Ok(CycleOutcome::Completed(report))
    }

    /// Attribute receipts to members. Receipts without a customer id or with
    /// an unknown one are dropped.
    async fn resolve_visits<D: UserDirectory>(
        receipts: &[Receipt],
        directory: &D,
        now: &Timestamp,
    ) -> Result<Vec<RawVisit>, DirectoryError> {
        let mut known: HashMap<&str, Option<User>> = HashMap::new();
        let mut raw_visits = Vec::with_capacity(receipts.len());

        for receipt in receipts {
            let Some(customer_id) = receipt.customer_id.as_deref() else {
                continue;
            };
            if !known.contains_key(customer_id) {
                let user = directory.get_by_loyalty_id(customer_id).await?;
                if user.is_none() {
                    tracing::debug!(customer_id, "visit_updater.customer.unknown");
                }
                known.insert(customer_id, user);
            }
            if let Some(Some(user)) = known.get(customer_id) {
                let at = receipt.created_at.with_timezone(now.offset());
                raw_visits.push(RawVisit::new(user.clone(), at));
            }
        }
        Ok(raw_visits)
    }

    /// Grant one reward per month crossed, then notify the member if reachable.
    async fn reward<L: Ledger, M: Messenger>(
        &self,
        update: &VisitUpdate,
        now: &Timestamp,
        ledger: &L,
        messenger: &M,
        report: &mut CycleReport,
    ) {
        let user = &update.user;
        if update.reached.is_empty() {
            return;
        }
        if !user.role().can_earn_points() {
            tracing::debug!(user = user.full_name(), role = %user.role(), "visit_updater.reward.ineligible");
            return;
        }

        for (month, reached) in &update.reached {
            let notice = match self.notifier.reward_notice(user, *month, reached, now) {
                Ok(Some(notice)) => notice,
                Ok(None) => continue,
                Err(error) => {
                    tracing::warn!(user = user.full_name(), %month, %error, "visit_updater.reward.failed");
                    report.failed_rewards.push(RewardFailure {
                        user: user.full_name().to_owned(),
                        month: *month,
                        error,
                    });
                    continue;
                }
            };

            if let Err(error) = ledger.grant_points(user, notice.total).await {
                tracing::warn!(user = user.full_name(), %month, %error, "visit_updater.grant.failed");
                report.failed_grants.push(GrantFailure {
                    user: user.full_name().to_owned(),
                    month: *month,
                    points: notice.total,
                    error,
                });
                continue;
            }
            tracing::info!(
                user = user.full_name(),
                %month,
                points = %notice.total,
                "visit_updater.grant.applied"
            );
            report.grants.push(Grant {
                user: user.full_name().to_owned(),
                month: *month,
                points: notice.total,
            });

            let Some(chat_id) = user.chat_id() else {
                continue;
            };
            match messenger.send_message(chat_id, &notice.message).await {
                Ok(()) => report.notifications += 1,
                Err(error) => {
                    tracing::warn!(user = user.full_name(), %error, "visit_updater.notify.failed");
                    report.failed_notifications.push(error);
                }
            }
        }
    }

    /// Run update cycles every `config.interval` until cancelled.
    ///
    /// Cycle errors are logged and the next cycle retries the same window.
    /// Ticks missed while a cycle runs are skipped, not queued. Returns after
    /// `config.iterations` cycles when set.
    pub async fn run<S, D, L, M>(&self, source: &S, directory: &D, ledger: &L, messenger: &M)
    where
        S: ReceiptSource,
        D: UserDirectory,
        L: Ledger,
        M: Messenger,
    {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if !self.config.run_on_start {
            // The first tick completes immediately.
            ticker.tick().await;
        }

        let mut count = 0u64;
        loop {
            ticker.tick().await;

            if let Err(error) = self.update_once(source, directory, ledger, messenger).await {
                tracing::error!(%error, "visit_updater.cycle.failed");
            }

            count += 1;
            if let Some(max) = self.config.iterations
                && count >= max
            {
                tracing::info!(count, "visit_updater.run.stopped: iteration limit reached");
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeDelta, TimeZone as _};
    use domain::UserRole;
    use receipts::{PagedReceiptSource, PagingConfig, ReceiptPage, ReceiptPages};
    use std::cell::RefCell;
    use visits::CheckpointTable;

    // ------------------------------------------------------------------
    // Test adapters
    // ------------------------------------------------------------------

    fn at(month: u32, day: u32, hour: u32) -> Timestamp {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, month, day, hour, 0, 0)
            .unwrap()
    }

    struct TestClock(Cell<Timestamp>);

    impl TestClock {
        fn at(now: Timestamp) -> Self {
            Self(Cell::new(now))
        }
    }

    impl Clock for &TestClock {
        fn now(&self) -> Timestamp {
            self.0.get()
        }
    }

    /// Serves receipts newer than `since`, recording each request.
    #[derive(Default)]
    struct TestSource {
        receipts: RefCell<Vec<Receipt>>,
        requests: RefCell<Vec<Timestamp>>,
        fail: Cell<bool>,
        /// Yield once per fetch so overlapping cycles can interleave.
        yield_first: bool,
    }

    impl TestSource {
        fn push(&self, customer_id: Option<&str>, created_at: Timestamp) {
            let mut receipts = self.receipts.borrow_mut();
            let receipt_number = format!("R-{}", receipts.len());
            receipts.push(Receipt {
                receipt_number,
                customer_id: customer_id.map(str::to_owned),
                created_at,
            });
        }
    }

    impl ReceiptSource for TestSource {
        async fn receipts_since(&self, since: Timestamp) -> Result<Vec<Receipt>, ReceiptError> {
            self.requests.borrow_mut().push(since);
            if self.yield_first {
                tokio::task::yield_now().await;
            }
            if self.fail.get() {
                return Err(ReceiptError::FetchFailed { reason: "timeout".to_owned() });
            }
            Ok(self.receipts.borrow().iter().filter(|r| r.created_at > since).cloned().collect())
        }
    }

    #[derive(Default)]
    struct TestDirectory {
        users: RefCell<Vec<User>>,
        lookups: Cell<usize>,
        saves: Cell<usize>,
        fail_save: Cell<bool>,
    }

    impl TestDirectory {
        fn with(users: Vec<User>) -> Self {
            Self { users: RefCell::new(users), ..Self::default() }
        }

        fn get(&self, name: &str) -> User {
            self.users.borrow().iter().find(|u| u.full_name() == name).cloned().unwrap()
        }
    }

    impl UserDirectory for TestDirectory {
        async fn get_by_loyalty_id(&self, loyalty_id: &str) -> Result<Option<User>, DirectoryError> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(self.users.borrow().iter().find(|u| u.loyalty_id() == Some(loyalty_id)).cloned())
        }

        async fn save_all(&self, users: &[User]) -> Result<(), DirectoryError> {
            if self.fail_save.get() {
                return Err(DirectoryError::Unavailable { reason: "locked".to_owned() });
            }
            self.saves.set(self.saves.get() + 1);
            let mut stored = self.users.borrow_mut();
            for user in users {
                if let Some(slot) = stored.iter_mut().find(|u| *u == user) {
                    *slot = user.clone();
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestLedger {
        grants: RefCell<Vec<(String, Points)>>,
        /// Names the ledger has no account for.
        unknown: Vec<String>,
    }

    impl Ledger for TestLedger {
        async fn balance(&self, user: &User) -> Result<Points, LedgerError> {
            let grants = self.grants.borrow();
            let own: Vec<Points> = grants.iter().filter(|(n, _)| n == user.full_name()).map(|(_, p)| *p).collect();
            Ok(Points::checked_sum(&own)?)
        }

        async fn grant_points(&self, user: &User, points: Points) -> Result<(), LedgerError> {
            if self.unknown.iter().any(|n| n == user.full_name()) {
                return Err(LedgerError::InvalidCustomer { name: user.full_name().to_owned() });
            }
            self.balance(user).await?.checked_add(points)?;
            self.grants.borrow_mut().push((user.full_name().to_owned(), points));
            Ok(())
        }

        async fn deduct_points(&self, _user: &User, _points: Points) -> Result<(), LedgerError> {
            Err(LedgerError::InsufficientFunds)
        }
    }

    #[derive(Default)]
    struct TestMessenger {
        sent: RefCell<Vec<(i64, String)>>,
        fail: bool,
    }

    impl Messenger for TestMessenger {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), MessengerError> {
            if self.fail {
                return Err(MessengerError::DeliveryFailed { reason: "blocked".to_owned() });
            }
            self.sent.borrow_mut().push((chat_id, text.to_owned()));
            Ok(())
        }
    }

    fn calculator() -> VisitCalculator {
        VisitCalculator::new(
            CheckpointTable::new([(2, Points::from(5_i64)), (3, Points::from(7_i64))]).unwrap(),
        )
    }

    fn updater(clock: &TestClock) -> VisitUpdater<&TestClock> {
        let config = VisitUpdaterConfig::builder().seed(1).build().unwrap();
        VisitUpdater::new(config, calculator(), clock)
    }

    fn member(name: &str, loyalty_id: &str) -> User {
        User::new(name).with_loyalty_id(loyalty_id)
    }

    fn completed(outcome: CycleOutcome) -> CycleReport {
        match outcome {
            CycleOutcome::Completed(report) => report,
            CycleOutcome::Skipped => panic!("cycle was skipped"),
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    #[test]
    fn config_rejects_zero_interval() {
        let result = VisitUpdaterConfig::builder().interval(Duration::ZERO).build();
        assert!(matches!(result, Err(UpdaterError::InvalidConfig { .. })));
    }

    #[test]
    fn watermark_starts_at_beginning_of_month() {
        let clock = TestClock::at(at(3, 17, 15));
        assert_eq!(updater(&clock).watermark(), at(3, 1, 0));
    }

    // ------------------------------------------------------------------
    // update_once
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn cycle_records_visits_grants_and_notifies() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        source.push(Some("c-ana"), at(3, 2, 19));
        source.push(Some("c-ana"), at(3, 3, 19));
        source.push(Some("c-ana"), at(3, 3, 20));
        source.push(None, at(3, 4, 19));
        source.push(Some("c-ghost"), at(3, 4, 19));
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana").with_chat_id(77)]);
        let ledger = TestLedger::default();
        let messenger = TestMessenger::default();
        let updater = updater(&clock);

        let report = completed(updater.update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert_eq!(report.raw_visits, 3);
        assert_eq!(report.updated_users, 1);
        assert_eq!(report.grants, vec![Grant {
            user: "Ana Pop".to_owned(),
            month: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            points: Points::from(5_i64),
        }]);
        assert_eq!(report.notifications, 1);
        assert_eq!(directory.saves.get(), 1);

        let ana = directory.get("Ana Pop");
        assert_eq!(ana.recent_visits(), 2);
        assert_eq!(ana.last_visit(), Some(at(3, 3, 19)));

        let sent = messenger.sent.borrow();
        assert_eq!(sent[0].0, 77);
        assert!(sent[0].1.contains("visited us on 2 occasions this month"), "{}", sent[0].1);
        assert_eq!(updater.watermark(), at(3, 10, 12));
        assert_eq!(*source.requests.borrow(), vec![at(3, 1, 0)]);
    }

    #[tokio::test]
    async fn lookups_are_cached_per_cycle() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        for day in 1..=4 {
            source.push(Some("c-ana"), at(3, day, 19));
        }
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana")]);

        let _ = updater(&clock)
            .update_once(&source, &directory, &TestLedger::default(), &TestMessenger::default())
            .await
            .unwrap();

        assert_eq!(directory.lookups.get(), 1);
    }

    #[tokio::test]
    async fn staff_visits_count_without_rewards() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        source.push(Some("c-bob"), at(3, 2, 19));
        source.push(Some("c-bob"), at(3, 3, 19));
        let directory = TestDirectory::with(vec![
            member("Bob Barman", "c-bob").with_role(UserRole::Staff).with_chat_id(5),
        ]);
        let ledger = TestLedger::default();
        let messenger = TestMessenger::default();

        let report = completed(updater(&clock).update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert_eq!(report.updated_users, 1);
        assert!(report.grants.is_empty());
        assert!(ledger.grants.borrow().is_empty());
        assert!(messenger.sent.borrow().is_empty());
        assert_eq!(directory.get("Bob Barman").recent_visits(), 2);
    }

    #[tokio::test]
    async fn unreachable_member_is_granted_silently() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        source.push(Some("c-ana"), at(3, 2, 19));
        source.push(Some("c-ana"), at(3, 3, 19));
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana")]);
        let ledger = TestLedger::default();
        let messenger = TestMessenger::default();

        let report = completed(updater(&clock).update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert_eq!(report.grants.len(), 1);
        assert_eq!(report.notifications, 0);
        assert!(messenger.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn one_grant_per_user_per_month() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        for day in 2..=4 {
            source.push(Some("c-ana"), at(3, day, 19));
        }
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana").with_chat_id(1)]);
        let ledger = TestLedger::default();
        let messenger = TestMessenger::default();

        let report = completed(updater(&clock).update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert_eq!(*ledger.grants.borrow(), vec![("Ana Pop".to_owned(), Points::from(12_i64))]);
        assert_eq!(report.notifications, 1);
        assert!(messenger.sent.borrow()[0].1.contains("a total of 12 points"));
    }

    #[tokio::test]
    async fn ledger_failure_is_isolated_per_user() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        for id in ["c-ana", "c-cid"] {
            source.push(Some(id), at(3, 2, 19));
            source.push(Some(id), at(3, 3, 19));
        }
        let directory = TestDirectory::with(vec![
            member("Ana Pop", "c-ana").with_chat_id(1),
            member("Cid Stan", "c-cid").with_chat_id(2),
        ]);
        let ledger = TestLedger { unknown: vec!["Ana Pop".to_owned()], ..TestLedger::default() };
        let messenger = TestMessenger::default();
        let updater = updater(&clock);

        let report = completed(updater.update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert_eq!(report.failed_grants.len(), 1);
        assert_eq!(report.failed_grants[0].user, "Ana Pop");
        assert!(matches!(report.failed_grants[0].error, LedgerError::InvalidCustomer { .. }));
        assert_eq!(report.grants.len(), 1);
        assert_eq!(report.grants[0].user, "Cid Stan");
        let sent = messenger.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 2);
        assert_eq!(updater.watermark(), at(3, 10, 12));
    }

    #[tokio::test]
    async fn messenger_failure_keeps_grant() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        source.push(Some("c-ana"), at(3, 2, 19));
        source.push(Some("c-ana"), at(3, 3, 19));
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana").with_chat_id(1)]);
        let ledger = TestLedger::default();
        let messenger = TestMessenger { fail: true, ..TestMessenger::default() };

        let report = completed(updater(&clock).update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert_eq!(report.grants.len(), 1);
        assert_eq!(report.failed_notifications.len(), 1);
        assert_eq!(ledger.grants.borrow().len(), 1);
    }

    #[tokio::test]
    async fn balance_overflow_is_a_failed_grant_not_a_crash() {
        let max: Points = "79228162514264337593543950335".parse().unwrap();
        let calculator = VisitCalculator::new(CheckpointTable::new([(2, max)]).unwrap());
        let config = VisitUpdaterConfig::builder().seed(1).build().unwrap();
        let clock = TestClock::at(at(3, 10, 12));
        let updater = VisitUpdater::new(config, calculator, &clock);
        let source = TestSource::default();
        source.push(Some("c-ana"), at(3, 2, 19));
        source.push(Some("c-ana"), at(3, 3, 19));
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana").with_chat_id(1)]);
        let ledger = TestLedger::default();
        let messenger = TestMessenger::default();

        let march = completed(updater.update_once(&source, &directory, &ledger, &messenger).await.unwrap());
        assert_eq!(march.grants.len(), 1);

        clock.0.set(at(4, 10, 12));
        source.push(Some("c-ana"), at(4, 2, 19));
        source.push(Some("c-ana"), at(4, 3, 19));
        let april = completed(updater.update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert!(april.grants.is_empty());
        assert_eq!(april.failed_grants.len(), 1);
        assert!(matches!(april.failed_grants[0].error, LedgerError::OutOfRange(_)));
        assert!(april.failed_rewards.is_empty());
        assert_eq!(updater.watermark(), at(4, 10, 12));
        assert_eq!(ledger.balance(&member("Ana Pop", "c-ana")).await.unwrap(), max);
        assert_eq!(messenger.sent.borrow().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_watermark() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        source.fail.set(true);
        let directory = TestDirectory::default();
        let updater = updater(&clock);

        let result = updater
            .update_once(&source, &directory, &TestLedger::default(), &TestMessenger::default())
            .await;

        assert!(matches!(result, Err(UpdaterError::Fetch(ReceiptError::FetchFailed { .. }))));
        assert_eq!(updater.watermark(), at(3, 1, 0));
    }

    #[tokio::test]
    async fn retry_after_failed_fetch_counts_window_once() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        source.push(Some("c-ana"), at(3, 2, 19));
        source.push(Some("c-ana"), at(3, 3, 19));
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana")]);
        let ledger = TestLedger::default();
        let messenger = TestMessenger::default();
        let updater = updater(&clock);

        let _ = completed(updater.update_once(&source, &directory, &ledger, &messenger).await.unwrap());
        clock.0.set(at(3, 10, 12) + TimeDelta::minutes(5));
        source.fail.set(true);
        assert!(updater.update_once(&source, &directory, &ledger, &messenger).await.is_err());

        // Recovery: the same window plus one new visit.
        source.fail.set(false);
        source.push(Some("c-ana"), at(3, 10, 12) + TimeDelta::minutes(1));
        clock.0.set(at(3, 10, 12) + TimeDelta::minutes(10));
        let report = completed(updater.update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert_eq!(report.raw_visits, 1);
        assert_eq!(directory.get("Ana Pop").recent_visits(), 3);
        let granted: Vec<Points> = ledger.grants.borrow().iter().map(|(_, p)| *p).collect();
        assert_eq!(granted, vec![Points::from(5_i64), Points::from(7_i64)]);
    }

    /// Offset-cursor pages over fixed receipts; can fail every page after the first.
    struct FlakyPages {
        receipts: Vec<Receipt>,
        fail_after_first: Cell<bool>,
    }

    impl ReceiptPages for FlakyPages {
        async fn fetch_page(
            &self,
            since: Timestamp,
            cursor: Option<&str>,
            limit: usize,
        ) -> Result<ReceiptPage, ReceiptError> {
            if cursor.is_some() && self.fail_after_first.get() {
                return Err(ReceiptError::FetchFailed { reason: "connection reset".to_owned() });
            }
            let pending: Vec<&Receipt> = self.receipts.iter().filter(|r| r.created_at > since).collect();
            let offset: usize = cursor.map_or(0, |c| c.parse().unwrap());
            let end = (offset + limit).min(pending.len());
            Ok(ReceiptPage {
                receipts: pending[offset..end].iter().copied().cloned().collect(),
                cursor: (end < pending.len()).then(|| end.to_string()),
            })
        }
    }

    #[tokio::test]
    async fn failure_mid_fetch_keeps_watermark_and_state() {
        let clock = TestClock::at(at(3, 10, 12));
        let receipts = [2, 3, 4]
            .into_iter()
            .map(|day| Receipt {
                receipt_number: format!("R-{day}"),
                customer_id: Some("c-ana".to_owned()),
                created_at: at(3, day, 19),
            })
            .collect();
        let pages = FlakyPages { receipts, fail_after_first: Cell::new(true) };
        let paging = PagingConfig::builder().page_size(2).build().unwrap();
        let source = PagedReceiptSource::new(pages, paging);
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana")]);
        let ledger = TestLedger::default();
        let messenger = TestMessenger::default();
        let updater = updater(&clock);

        let result = updater.update_once(&source, &directory, &ledger, &messenger).await;

        assert!(matches!(result, Err(UpdaterError::Fetch(ReceiptError::FetchFailed { .. }))), "{result:?}");
        assert_eq!(updater.watermark(), at(3, 1, 0));
        assert_eq!(directory.saves.get(), 0);
        assert_eq!(directory.get("Ana Pop").recent_visits(), 0);
        assert!(ledger.grants.borrow().is_empty());

        source.pages().fail_after_first.set(false);
        let report = completed(updater.update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert_eq!(report.raw_visits, 3);
        assert_eq!(directory.get("Ana Pop").recent_visits(), 3);
        let granted: Vec<Points> = ledger.grants.borrow().iter().map(|(_, p)| *p).collect();
        assert_eq!(granted, vec![Points::from(12_i64)]);
        assert_eq!(updater.watermark(), at(3, 10, 12));
    }

    #[tokio::test]
    async fn save_failure_keeps_watermark_and_skips_grants() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        source.push(Some("c-ana"), at(3, 2, 19));
        source.push(Some("c-ana"), at(3, 3, 19));
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana")]);
        directory.fail_save.set(true);
        let ledger = TestLedger::default();
        let updater = updater(&clock);

        let result = updater.update_once(&source, &directory, &ledger, &TestMessenger::default()).await;

        assert!(matches!(result, Err(UpdaterError::Directory(_))));
        assert!(ledger.grants.borrow().is_empty());
        assert_eq!(updater.watermark(), at(3, 1, 0));
    }

    #[tokio::test]
    async fn watermark_advances_and_window_is_not_reprocessed() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        source.push(Some("c-ana"), at(3, 2, 19));
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana")]);
        let ledger = TestLedger::default();
        let messenger = TestMessenger::default();
        let updater = updater(&clock);

        let _ = updater.update_once(&source, &directory, &ledger, &messenger).await.unwrap();
        clock.0.set(at(3, 10, 12) + TimeDelta::minutes(5));
        let second = completed(updater.update_once(&source, &directory, &ledger, &messenger).await.unwrap());

        assert_eq!(second.raw_visits, 0);
        assert_eq!(second.updated_users, 0);
        assert_eq!(directory.saves.get(), 1, "empty cycles never save");
        assert_eq!(*source.requests.borrow(), vec![at(3, 1, 0), at(3, 10, 12)]);
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource { yield_first: true, ..TestSource::default() };
        let directory = TestDirectory::default();
        let ledger = TestLedger::default();
        let messenger = TestMessenger::default();
        let updater = updater(&clock);

        let (first, second) = tokio::join!(
            updater.update_once(&source, &directory, &ledger, &messenger),
            updater.update_once(&source, &directory, &ledger, &messenger),
        );

        assert!(matches!(first, Ok(CycleOutcome::Completed(_))));
        assert!(matches!(second, Ok(CycleOutcome::Skipped)));
        assert_eq!(source.requests.borrow().len(), 1);

        // The guard is released once the cycle ends.
        let third = updater.update_once(&source, &directory, &ledger, &messenger).await;
        assert!(matches!(third, Ok(CycleOutcome::Completed(_))));
    }

    #[tokio::test]
    async fn receipts_are_shifted_to_local_offset() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        // 22:30 UTC on Feb 28 is March 1 at UTC+2, so it counts for March.
        let utc = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 2, 28, 22, 30, 0).unwrap();
        source.push(Some("c-ana"), utc);
        let directory = TestDirectory::with(vec![member("Ana Pop", "c-ana")]);

        let _ = updater(&clock)
            .update_once(&source, &directory, &TestLedger::default(), &TestMessenger::default())
            .await
            .unwrap();

        let ana = directory.get("Ana Pop");
        assert_eq!(ana.recent_visits(), 1);
        assert_eq!(ana.last_visit().map(|t| *t.offset()), Some(*at(3, 1, 0).offset()));
    }

    // ------------------------------------------------------------------
    // run
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn run_bounded_iterations_and_survives_errors() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        source.fail.set(true);
        let config = VisitUpdaterConfig::builder()
            .interval(Duration::from_secs(60))
            .iterations(3)
            .seed(1)
            .build()
            .unwrap();
        let updater = VisitUpdater::new(config, calculator(), &clock);

        let started = tokio::time::Instant::now();
        updater
            .run(&source, &TestDirectory::default(), &TestLedger::default(), &TestMessenger::default())
            .await;

        assert_eq!(source.requests.borrow().len(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn run_without_initial_cycle_waits_one_interval() {
        let clock = TestClock::at(at(3, 10, 12));
        let source = TestSource::default();
        let config = VisitUpdaterConfig::builder()
            .interval(Duration::from_secs(60))
            .run_on_start(false)
            .iterations(1)
            .build()
            .unwrap();
        let updater = VisitUpdater::new(config, calculator(), &clock);

        let started = tokio::time::Instant::now();
        updater
            .run(&source, &TestDirectory::default(), &TestLedger::default(), &TestMessenger::default())
            .await;

        assert_eq!(source.requests.borrow().len(), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }
}
