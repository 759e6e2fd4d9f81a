// Rust guideline compliant 2026-10-18

//! YAML configuration for the bot binary.
//!
//! Read from the file named by `LOYALTY_BOT_CONFIG`, else `loyalty_bot.yaml`
//! in the working directory, else built-in defaults. Every field is optional.

use anyhow::Context as _;
use chrono::{FixedOffset, NaiveTime, TimeDelta};
use domain::{Points, User, UserRole};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use visits::{CheckpointTable, VisitCalculator};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "LOYALTY_BOT_CONFIG";

/// Configuration file read when `CONFIG_ENV` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "loyalty_bot.yaml";

/// Where members and their visit state are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase", deny_unknown_fields)]
pub enum DirectoryBackend {
    #[default]
    Memory,
    Sqlite {
        /// e.g. `sqlite:loyalty_bot.db`
        url: String,
    },
}

/// A member known to the bot at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberConfig {
    /// Unique display name.
    pub full_name: String,
    /// Customer id at the point of sale.
    pub loyalty_id: String,
    /// Nicknames; the first is preferred.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Chat handle, without `@`.
    #[serde(default)]
    pub chat_username: Option<String>,
    /// Private chat to send reward notices to.
    #[serde(default)]
    pub chat_id: Option<i64>,
    /// `champion` or `staff`.
    #[serde(default)]
    pub role: UserRole,
}

impl MemberConfig {
    fn to_user(&self) -> User {
        let mut user = User::new(&self.full_name)
            .with_loyalty_id(&self.loyalty_id)
            .with_aliases(self.aliases.clone())
            .with_role(self.role);
        if let Some(username) = &self.chat_username {
            user = user.with_chat_username(username);
        }
        if let Some(chat_id) = self.chat_id {
            user = user.with_chat_id(chat_id);
        }
        user
    }
}

/// Synthetic point-of-sale traffic for demo runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    /// Upper bound on receipts generated per cycle.
    pub max_receipts_per_cycle: usize,
    /// Share of generated receipts without a customer.
    pub walk_in_percent: u32,
    /// Receipts per page.
    pub page_size: usize,
    /// Pages per fetch before giving up.
    pub max_pages: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            max_receipts_per_cycle: 8,
            walk_in_percent: 20,
            page_size: 250,
            max_pages: 100,
        }
    }
}

/// Top-level bot configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    /// Business timezone as a whole-hour offset from UTC.
    pub utc_offset_hours: i32,
    /// Seconds between update cycles.
    pub update_interval_secs: u64,
    /// Receipts closer together than this count as one visit.
    pub collapse_window_hours: i64,
    /// `HH:MM`, assumed for visits recorded without a time of day.
    pub default_visit_time: String,
    /// Visit count to reward.
    pub checkpoints: BTreeMap<u32, Points>,
    /// Stop after this many update cycles. Unset runs until CTRL+C.
    pub iterations: Option<u64>,
    /// Seed for the message and demo generators. `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Where members are stored.
    pub directory: DirectoryBackend,
    /// Members seeded into the directory at startup.
    pub members: Vec<MemberConfig>,
    /// Synthetic receipt settings.
    pub demo: DemoConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 2,
            update_interval_secs: 5 * 60,
            collapse_window_hours: 8,
            default_visit_time: "19:00".to_owned(),
            checkpoints: BTreeMap::from([
                (5, Points::from(10_i64)),
                (10, Points::from(20_i64)),
                (15, Points::from(30_i64)),
                (20, Points::from(50_i64)),
            ]),
            iterations: None,
            seed: None,
            directory: DirectoryBackend::default(),
            members: vec![],
            demo: DemoConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load from `CONFIG_ENV`, then `DEFAULT_CONFIG_PATH`, then defaults.
    ///
    /// # Errors
    ///
    /// Fails when the named file cannot be read or parsed. A missing default
    /// file is not an error.
    pub fn load() -> anyhow::Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::from_file(default_path);
        }
        tracing::info!("config.defaults: no {DEFAULT_CONFIG_PATH} found");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_yaml(&text).with_context(|| format!("invalid {}", path.display()))?;
        tracing::info!(path = %path.display(), "config.loaded");
        Ok(config)
    }

    /// # Errors
    ///
    /// Fails on malformed YAML or unknown fields.
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// # Errors
    ///
    /// Fails when the offset is beyond ±23 hours.
    pub fn offset(&self) -> anyhow::Result<FixedOffset> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .with_context(|| format!("utc_offset_hours {} is out of range", self.utc_offset_hours))
    }

    /// # Errors
    ///
    /// Fails unless the value reads as `HH:MM`.
    pub fn visit_time(&self) -> anyhow::Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.default_visit_time, "%H:%M")
            .with_context(|| format!("default_visit_time {:?} is not HH:MM", self.default_visit_time))
    }

    /// Time between update cycles.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// # Errors
    ///
    /// Fails on a zero checkpoint or a non-positive collapse window.
    pub fn calculator(&self) -> anyhow::Result<VisitCalculator> {
        let table = CheckpointTable::new(self.checkpoints.iter().map(|(c, p)| (*c, *p)))?;
        let window = TimeDelta::try_hours(self.collapse_window_hours)
            .context("collapse_window_hours is out of range")?;
        Ok(VisitCalculator::builder(table).collapse_window(window).build()?)
    }

    /// Configured members as domain users.
    #[must_use]
    pub fn members(&self) -> Vec<User> {
        self.members.iter().map(MemberConfig::to_user).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
