// Rust guideline compliant 2026-10-18

//! Member-facing text: reward notices sent after a checkpoint is crossed, and
//! the replies to "how many visits" and "what is my balance" questions.
//!
//! Entry points: [`Notifier::reward_notice`], [`visit_status`], [`balance_reply`].
//! Configuration via [`NotifierConfig::builder`].

use chrono::{NaiveDate, TimeDelta};
use domain::{Points, PointsError, Timestamp, User};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom as _};
use std::cell::RefCell;
use std::collections::BTreeMap;
use visits::{Checkpoints, VisitCalculator, month_of};

// ---------------------------------------------------------------------------
// NotifierError
// ---------------------------------------------------------------------------

/// Errors that can occur while configuring the notifier.
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    /// The supplied configuration is invalid.
    #[error("invalid notifier configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The checkpoint rewards for one month cannot be totalled.
    #[error("reward total out of range: {0}")]
    RewardOutOfRange(#[from] PointsError),
}

// ---------------------------------------------------------------------------
// MessageBag
// ---------------------------------------------------------------------------

/// Non-empty pool of interchangeable congratulation lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBag(Vec<String>);

impl MessageBag {
    /// # Errors
    ///
    /// Returns [`NotifierError::InvalidConfig`] when `messages` is empty.
    pub fn new<S: Into<String>>(messages: impl IntoIterator<Item = S>) -> Result<Self, NotifierError> {
        let messages: Vec<String> = messages.into_iter().map(Into::into).collect();
        if messages.is_empty() {
            return Err(NotifierError::InvalidConfig {
                reason: "message bag must hold at least one message".to_owned(),
            });
        }
        Ok(Self(messages))
    }

    /// Pick one line uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        // Never empty, so the fallback is unreachable.
        self.0.choose(rng).map_or("", String::as_str)
    }

    /// All lines in the bag.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

/// Congratulation pools keyed by the checkpoint they celebrate.
pub type MessagePools = BTreeMap<u32, MessageBag>;

fn bag(lines: &[&str]) -> MessageBag {
    MessageBag(lines.iter().map(|line| (*line).to_owned()).collect())
}

/// Built-in pools for the 5, 10, 15 and 20 visit checkpoints.
#[must_use]
pub fn default_pools() -> MessagePools {
    BTreeMap::from([
        (
            5,
            bag(&[
                "High-five! We knew you loved us, but now it's official – you're practically family!",
                "You've hit the 'Fab Five' mark. Your dedication to T5 is so commendable; we're considering giving Mici a tattoo with your name!",
                "Boom! You've just hit the 'Fantastic Five.' You're not just a champion; you're a rockstar!",
                "Five visits is impressive – you're like the James Bond of T5 Champions. Shaken, not stirred by our hospitality, we hope!",
                "Five visits in a month - if there were a Nobel Prize for hostel loyalty, we would nominate you for sure!",
                "High-five! Your dedication is like WiFi – it never wavers, and we love it!",
                "High-five! If there were an Olympic sport for hostel visits, you'd be taking home the gold!",
                "Five visits – you're a superhero of hospitality appreciation. Cape not included, but you've earned it in spirit!",
                "Five visits in a month – do you have a secret teleporter directly to our doorstep?",
                "You've officially joined the 'High Five Heroes'! We're starting to think you have a GPS set to our front door – not that we mind!",
                "You've reached the 'Frequent Flyer Five' milestone. We're pretty sure your passport has a permanent stamp from our hostel now.",
                "Brace yourself – you're now part of the 'Five-Time Fiesta.' Your dedication is legendary!",
            ]),
        ),
        (
            10,
            bag(&[
                "Double digits, baby! You're now a certified 'Perfect Ten' enthusiast. We're thinking of adding a star to our logo just for you.",
                "Hold on to your hats, folks! Ten visits in a month – are you sure you don't have a secret room here?",
                "Brace yourself; you've just become the 'Hostel Hottie at Ten.' Our doors are always open for the hottest champions, and you've secured your spot!",
                "You've entered the 'Penthouse of Patrons'! Ten visits in a month? We might need to create a new VIP level just for you!",
                "Buckle up, because you're now a member of the 'Perfect Ten Club'. We're considering making a bronze statue of you right next to our reception. Strike a pose!",
                "Alert the press! We've got a 'Ten-Time Trailblazer' in our midst. Your loyalty deserves a standing ovation and possibly a Hollywood adaptation of your adventures.",
                "You've reached the 'Ten-Time Wonder' status. If we had a red carpet, it would be rolled out just for you. You're the VIP of VIPs!",
                "We're not sure if you're a guest or a magician, but either way, you've just pulled off the 'Ten-Time Sorcery'.",
            ]),
        ),
        (
            15,
            bag(&[
                "Hold onto your hats – you've entered the realm of the 'Fifteen-Time Fanatics.' Your commitment to T5 socializing is simply awe-inspiring!",
                "Bravo! You've achieved the 'Fifteen-Visit Fiesta' status. At this point, we're pretty sure you know every nook and cranny of our hostel better than we do!",
                "Alert the history books – you're now a member of the 'Fifteen-Timer's Club.' Your visits have become legendary tales whispered among travelers!",
                "Unbelievable! You've reached the 'Fifteen-Time Trailblazer' level. If there were a trophy for hostel exploration, it would have your name engraved on it!",
                "Congratulations! You've unlocked the 'Fifteen-Frequent Flyer' achievement. Your dedication to adventure knows no bounds – we're honored to be a part of your journey!",
            ]),
        ),
        (
            20,
            bag(&[
                "Epic alert! You've reached the 'Double-Deca-Dynamo' status. We're pretty sure you're part-time staff at this point – any chance you can start tomorrow?",
                "We bow down to the 'Hostel Guru.' Twenty visits? You're not a champion; you're part of the furniture – in a good way!",
                "Hold onto your hats, folks – we've got a 'Twenty-Time Tycoon' in the building! Your loyalty is so legendary; we're thinking of naming our next room after you.",
                "What in the wanderlust! You're not just a champion; you're a 'Hostel Hercules.' Twenty visits is Herculean, and we're in awe of your globetrotting prowess.",
            ]),
        ),
    ])
}

// ---------------------------------------------------------------------------
// NotifierConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`Notifier`].
///
/// Construct via [`NotifierConfig::builder`].
#[derive(Debug)]
pub struct NotifierConfig {
    /// Congratulation pools by checkpoint. Checkpoints without a pool get the
    /// bare thank-you sentence.
    pub pools: MessagePools,
    /// Optional RNG seed for reproducible message choice. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Builder for [`NotifierConfig`].
///
/// Obtain via [`NotifierConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct NotifierConfigBuilder {
    pools: MessagePools,
    seed: Option<u64>,
}

impl NotifierConfig {
    /// Create a builder.
    ///
    /// Default values: `pools = default_pools()`, `seed = None`.
    #[must_use]
    pub fn builder() -> NotifierConfigBuilder {
        NotifierConfigBuilder { pools: default_pools(), seed: None }
    }
}

impl NotifierConfigBuilder {
    /// Replace every pool.
    #[must_use]
    pub fn pools(mut self, pools: MessagePools) -> Self {
        self.pools = pools;
        self
    }

    /// Add or replace the pool for one checkpoint.
    #[must_use]
    pub fn pool(mut self, checkpoint: u32, messages: MessageBag) -> Self {
        self.pools.insert(checkpoint, messages);
        self
    }

    /// Fix the RNG seed for deterministic output (useful in tests).
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NotifierError::InvalidConfig`] when a pool is keyed by 0.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<NotifierConfig, NotifierError> {
        if self.pools.contains_key(&0) {
            return Err(NotifierError::InvalidConfig {
                reason: "message pools must be keyed by checkpoints >= 1".to_owned(),
            });
        }
        Ok(NotifierConfig { pools: self.pools, seed: self.seed })
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// The grant and announcement for one user and one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardNotice {
    /// First day of the month the visits were made in.
    pub month: NaiveDate,
    /// Highest checkpoint crossed in `month`.
    pub max_checkpoint: u32,
    /// Number of checkpoints crossed in `month`.
    pub checkpoint_count: usize,
    /// Sum of the rewards of every checkpoint crossed in `month`.
    pub total: Points,
    /// Text to send to the member.
    pub message: String,
}

/// Builds reward notices, picking congratulation lines at random.
#[derive(Debug)]
pub struct Notifier {
    config: NotifierConfig,
    /// Interior mutability required because all public methods take `&self`.
    rng: RefCell<StdRng>,
}

impl Notifier {
    /// Create a new notifier from `config`.
    ///
    /// Seeds the RNG from `config.seed` if set, otherwise from the OS.
    #[must_use]
    pub fn new(config: NotifierConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, rng: RefCell::new(rng) }
    }

    /// Build the notice for the checkpoints `user` crossed in `month`.
    ///
    /// Returns `Ok(None)` when `reached` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`NotifierError::RewardOutOfRange`] when the rewards overflow.
    pub fn reward_notice(
        &self,
        user: &User,
        month: NaiveDate,
        reached: &Checkpoints,
        now: &Timestamp,
    ) -> Result<Option<RewardNotice>, NotifierError> {
        let Some((&max_checkpoint, _)) = reached.last_key_value() else {
            return Ok(None);
        };
        let total = Points::checked_sum(reached.values())?;
        let pool_line = self
            .config
            .pools
            .get(&max_checkpoint)
            .map(|bag| bag.choose(&mut *self.rng.borrow_mut()).to_owned());

        let message = reward_message(pool_line.as_deref(), month, reached, total, now);
        tracing::debug!(
            user = user.full_name(),
            %month,
            max_checkpoint,
            %total,
            "notifier.reward.formatted"
        );
        Ok(Some(RewardNotice {
            month,
            max_checkpoint,
            checkpoint_count: reached.len(),
            total,
            message,
        }))
    }
}

/// Render a reward announcement worth `total` points.
fn reward_message(
    pool_line: Option<&str>,
    month: NaiveDate,
    reached: &Checkpoints,
    total: Points,
    now: &Timestamp,
) -> String {
    let max_checkpoint = reached.keys().next_back().copied().unwrap_or(0);
    let a_total_of = if reached.len() > 1 { "a total of " } else { "" };
    let month_text = if month == month_of(now) {
        "this month".to_owned()
    } else {
        format!("in {}", month.format("%B"))
    };

    let thanks = format!(
        "Because you visited us on {max_checkpoint} occasions {month_text}, \
         we want to thank you for your persistence with {a_total_of}{total} point{}!",
        plural(total)
    );
    match pool_line {
        Some(line) => format!("{line}\n\n{thanks}"),
        None => thanks,
    }
}

fn plural(points: Points) -> &'static str {
    if points == Points::from(1_i64) { "" } else { "s" }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Reply describing `user`'s visits this month and the road to the next reward.
#[must_use]
pub fn visit_status(user: &User, now: &Timestamp, calculator: &VisitCalculator) -> String {
    let visits_this_month = VisitCalculator::get_visits_this_month(user, now);
    let mut parts = vec![];

    if visits_this_month > 0 {
        parts.push(format!("You visited us {visits_this_month} times this month!"));
    } else {
        parts.push(
            "I haven't seen you around at all this month! Or maybe you're here right now for the first time?"
                .to_owned(),
        );
    }

    if let Some(last) = user.last_visit() {
        let date_format = if last < *now - TimeDelta::days(365) {
            "%d %B %Y"
        } else if last < *now - TimeDelta::days(7) {
            "%d %B"
        } else {
            "%A, %d %B"
        };
        parts.push(format!("The last time I saw you here was on {}.", last.format(date_format)));
    }

    if user.role().can_earn_points()
        && let Some((checkpoint, reward)) = calculator.next_checkpoint(visits_this_month)
    {
        let remaining = checkpoint - visits_this_month;
        let more = if visits_this_month > 0 { "more " } else { "" };
        parts.push(format!(
            "If you visit {remaining} {more}times, you will be rewarded with {reward} points!"
        ));
    }

    parts.push("Please remember to pay your tab at the bar so I can tell you've been around.".to_owned());
    parts.join("\n\n")
}

/// Reply stating a ledger balance, rounded down to whole points.
#[must_use]
pub fn balance_reply(balance: Points) -> String {
    format!("You have {} loyalty points!", balance.to_integral())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone as _};
    use domain::UserRole;
    use visits::CheckpointTable;

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn at(year: i32, month: u32, day: u32) -> Timestamp {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(year, month, day, 19, 0, 0)
            .unwrap()
    }

    fn first_of(month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, 1).unwrap()
    }

    fn checkpoints(entries: &[(u32, i64)]) -> Checkpoints {
        entries.iter().map(|(c, p)| (*c, Points::from(*p))).collect()
    }

    fn calculator() -> VisitCalculator {
        VisitCalculator::new(
            CheckpointTable::new([(5, Points::from(10_i64)), (10, Points::from(20_i64))]).unwrap(),
        )
    }

    fn notifier(seed: u64) -> Notifier {
        Notifier::new(NotifierConfig::builder().seed(seed).build().unwrap())
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    #[test]
    fn empty_bag_is_rejected() {
        let result = MessageBag::new(Vec::<String>::new());
        assert!(matches!(result, Err(NotifierError::InvalidConfig { .. })));
    }

    #[test]
    fn zero_keyed_pool_is_rejected() {
        let result = NotifierConfig::builder()
            .pool(0, MessageBag::new(["hi"]).unwrap())
            .build();
        assert!(matches!(result, Err(NotifierError::InvalidConfig { .. })));
    }

    #[test]
    fn default_pools_cover_standard_checkpoints() {
        let pools = default_pools();
        assert_eq!(pools.keys().copied().collect::<Vec<_>>(), vec![5, 10, 15, 20]);
        let sizes: Vec<usize> = pools.values().map(|bag| bag.messages().len()).collect();
        assert_eq!(sizes, vec![12, 8, 5, 4]);
    }

    // ------------------------------------------------------------------
    // Reward notices
    // ------------------------------------------------------------------

    #[test]
    fn single_checkpoint_this_month() {
        let config = NotifierConfig::builder()
            .pool(5, MessageBag::new(["Nice!"]).unwrap())
            .seed(1)
            .build()
            .unwrap();
        let notice = Notifier::new(config)
            .reward_notice(&User::new("Ana Pop"), first_of(3), &checkpoints(&[(5, 10)]), &at(2026, 3, 20))
            .unwrap()
            .unwrap();

        assert_eq!(notice.total, Points::from(10_i64));
        assert_eq!(notice.max_checkpoint, 5);
        assert_eq!(notice.checkpoint_count, 1);
        assert_eq!(
            notice.message,
            "Nice!\n\nBecause you visited us on 5 occasions this month, \
             we want to thank you for your persistence with 10 points!"
        );
    }

    #[test]
    fn several_checkpoints_in_past_month() {
        let text = reward_message(
            None,
            first_of(1),
            &checkpoints(&[(5, 10), (6, 3)]),
            Points::from(13_i64),
            &at(2026, 3, 20),
        );
        assert_eq!(
            text,
            "Because you visited us on 6 occasions in January, \
             we want to thank you for your persistence with a total of 13 points!"
        );
    }

    #[test]
    fn one_point_is_singular() {
        let text = reward_message(None, first_of(3), &checkpoints(&[(2, 1)]), Points::from(1_i64), &at(2026, 3, 20));
        assert!(text.ends_with("with 1 point!"), "{text}");
    }

    #[test]
    fn checkpoint_without_pool_has_no_preamble() {
        let notice = notifier(1)
            .reward_notice(&User::new("Ana Pop"), first_of(3), &checkpoints(&[(7, 4)]), &at(2026, 3, 20))
            .unwrap()
            .unwrap();
        assert!(notice.message.starts_with("Because you visited us on 7 occasions"));
    }

    #[test]
    fn pool_is_keyed_by_highest_checkpoint() {
        let notice = notifier(2)
            .reward_notice(
                &User::new("Ana Pop"),
                first_of(3),
                &checkpoints(&[(5, 10), (10, 20)]),
                &at(2026, 3, 20),
            )
            .unwrap()
            .unwrap();
        let (line, _) = notice.message.split_once("\n\n").unwrap();
        assert!(default_pools()[&10].messages().iter().any(|m| m == line), "{line}");
        assert_eq!(notice.total, Points::from(30_i64));
    }

    #[test]
    fn empty_checkpoints_yield_no_notice() {
        let notice = notifier(3).reward_notice(&User::new("Ana Pop"), first_of(3), &Checkpoints::new(), &at(2026, 3, 20));
        assert!(matches!(notice, Ok(None)));
    }

    #[test]
    fn overflowing_rewards_are_an_error() {
        let max: Points = "79228162514264337593543950335".parse().unwrap();
        let reached = Checkpoints::from([(1, max), (2, max)]);

        let result = notifier(3).reward_notice(&User::new("Ana Pop"), first_of(3), &reached, &at(2026, 3, 20));

        assert!(matches!(result, Err(NotifierError::RewardOutOfRange(_))), "{result:?}");
    }

    #[test]
    fn seeded_choice_is_deterministic() {
        let reached = checkpoints(&[(5, 10)]);
        let user = User::new("Ana Pop");
        let a: Vec<String> = {
            let n = notifier(42);
            (0..10).map(|_| n.reward_notice(&user, first_of(3), &reached, &at(2026, 3, 20)).unwrap().unwrap().message).collect()
        };
        let b: Vec<String> = {
            let n = notifier(42);
            (0..10).map(|_| n.reward_notice(&user, first_of(3), &reached, &at(2026, 3, 20)).unwrap().unwrap().message).collect()
        };
        assert_eq!(a, b);
    }

    // ------------------------------------------------------------------
    // Replies
    // ------------------------------------------------------------------

    #[test]
    fn status_for_active_member() {
        let user = User::new("Ana Pop").with_visits(3, Some(at(2026, 3, 18)));
        let reply = visit_status(&user, &at(2026, 3, 20), &calculator());
        assert_eq!(
            reply,
            "You visited us 3 times this month!\n\n\
             The last time I saw you here was on Wednesday, 18 March.\n\n\
             If you visit 2 more times, you will be rewarded with 10 points!\n\n\
             Please remember to pay your tab at the bar so I can tell you've been around."
        );
    }

    #[test]
    fn status_for_absent_member_uses_longer_date_formats() {
        let calc = calculator();
        let recent = User::new("Ana Pop").with_visits(2, Some(at(2026, 2, 10)));
        let reply = visit_status(&recent, &at(2026, 3, 20), &calc);
        assert!(reply.starts_with("I haven't seen you around at all this month!"));
        assert!(reply.contains("was on 10 February."), "{reply}");
        assert!(reply.contains("If you visit 5 times,"), "{reply}");

        let ancient = User::new("Ana Pop").with_visits(2, Some(at(2024, 2, 10)));
        let reply = visit_status(&ancient, &at(2026, 3, 20), &calc);
        assert!(reply.contains("was on 10 February 2024."), "{reply}");
    }

    #[test]
    fn status_for_new_member_has_no_last_visit() {
        let reply = visit_status(&User::new("Ana Pop"), &at(2026, 3, 20), &calculator());
        assert!(!reply.contains("last time"));
        assert_eq!(reply.split("\n\n").count(), 3);
    }

    #[test]
    fn staff_get_no_reward_hint() {
        let user = User::new("Bob Barman")
            .with_role(UserRole::Staff)
            .with_visits(3, Some(at(2026, 3, 18)));
        let reply = visit_status(&user, &at(2026, 3, 20), &calculator());
        assert!(!reply.contains("rewarded"));
    }

    #[test]
    fn no_hint_past_highest_checkpoint() {
        let user = User::new("Ana Pop").with_visits(12, Some(at(2026, 3, 18)));
        let reply = visit_status(&user, &at(2026, 3, 20), &calculator());
        assert!(!reply.contains("rewarded"));
    }

    #[test]
    fn balance_is_floored() {
        assert_eq!(balance_reply("12.9".parse().unwrap()), "You have 12 loyalty points!");
        assert_eq!(balance_reply(Points::ZERO), "You have 0 loyalty points!");
    }
}
