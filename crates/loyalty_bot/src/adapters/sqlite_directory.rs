// Rust guideline compliant 2026-10-18

//! SQLite adapter for the `UserDirectory` port.
//!
//! Persists members and their visit state to a SQLite file via `sqlx`.
//!
//! # Storage format
//!
//! `last_visit` is stored as RFC 3339 text. Rows written by older tools may
//! hold a bare `YYYY-MM-DD` date; those read back at the configured default
//! visit time in the business offset. Aliases are stored newline-separated.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use domain::{DirectoryError, Timestamp, User, UserDirectory, UserRole};
use sqlx::Row as _;
use sqlx::sqlite::SqliteRow;

/// `UserDirectory` adapter backed by a SQLite database via `sqlx`.
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: sqlx::SqlitePool,
    offset: FixedOffset,
    default_visit_time: NaiveTime,
}

impl SqliteDirectory {
    /// Open or create a SQLite database and initialize the schema.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` when the connection or schema creation fails.
    pub async fn new(
        db_url: &str,
        offset: FixedOffset,
        default_visit_time: NaiveTime,
    ) -> Result<Self, sqlx::Error> {
        let opts = db_url
            .parse::<sqlx::sqlite::SqliteConnectOptions>()?
            .create_if_missing(true);
        // One connection: a single writer, and a dropped transaction is
        // rolled back before the next statement runs.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                full_name      TEXT    PRIMARY KEY,
                aliases        TEXT    NOT NULL DEFAULT '',
                chat_username  TEXT,
                chat_id        INTEGER,
                loyalty_id     TEXT    UNIQUE,
                role           TEXT    NOT NULL DEFAULT 'champion',
                recent_visits  INTEGER NOT NULL DEFAULT 0,
                last_visit     TEXT
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool, offset, default_visit_time })
    }

    /// Insert members that are not stored yet. Existing rows, including their
    /// visit state, are left alone.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Unavailable` on any `sqlx` error.
    pub async fn seed(&self, users: &[User]) -> Result<(), DirectoryError> {
        self.write_all(
            "INSERT OR IGNORE INTO users
             (full_name, aliases, chat_username, chat_id, loyalty_id, role,
              recent_visits, last_visit)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            users,
        )
        .await
    }

    /// Run `sql` once per user inside a single transaction.
    async fn write_all(&self, sql: &'static str, users: &[User]) -> Result<(), DirectoryError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for user in users {
            sqlx::query(sql)
                .bind(user.full_name())
                .bind(user.aliases().join("\n"))
                .bind(user.chat_username())
                .bind(user.chat_id())
                .bind(user.loyalty_id())
                .bind(user.role().as_str())
                .bind(i64::from(user.recent_visits()))
                .bind(user.last_visit().map(|at| at.to_rfc3339()))
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)
    }

    fn row_to_user(&self, row: &SqliteRow) -> Result<User, DirectoryError> {
        let full_name: String = row.try_get("full_name").map_err(corrupt)?;
        let aliases: String = row.try_get("aliases").map_err(corrupt)?;
        let chat_username: Option<String> = row.try_get("chat_username").map_err(corrupt)?;
        let chat_id: Option<i64> = row.try_get("chat_id").map_err(corrupt)?;
        let loyalty_id: Option<String> = row.try_get("loyalty_id").map_err(corrupt)?;
        let role: String = row.try_get("role").map_err(corrupt)?;
        let recent_visits: i64 = row.try_get("recent_visits").map_err(corrupt)?;
        let last_visit: Option<String> = row.try_get("last_visit").map_err(corrupt)?;

        let role: UserRole = role.parse().map_err(corrupt)?;
        let recent_visits = u32::try_from(recent_visits).map_err(corrupt)?;
        let last_visit = last_visit
            .as_deref()
            .map(|text| self.parse_last_visit(text))
            .transpose()?;

        let mut user = User::new(full_name)
            .with_aliases(aliases.lines().map(str::to_owned).collect())
            .with_role(role);
        if let Some(username) = chat_username {
            user = user.with_chat_username(username);
        }
        if let Some(chat_id) = chat_id {
            user = user.with_chat_id(chat_id);
        }
        if let Some(loyalty_id) = loyalty_id {
            user = user.with_loyalty_id(loyalty_id);
        }
        Ok(user.with_visits(recent_visits, last_visit))
    }

    fn parse_last_visit(&self, text: &str) -> Result<Timestamp, DirectoryError> {
        if let Ok(at) = DateTime::parse_from_rfc3339(text) {
            return Ok(at.with_timezone(&self.offset));
        }
        let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| DirectoryError::Corrupt {
            reason: format!("last_visit {text:?}: {e}"),
        })?;
        Ok(visits::visit_timestamp(date, None, self.default_visit_time, self.offset))
    }
}

fn unavailable(e: sqlx::Error) -> DirectoryError {
    tracing::error!(error = %e, "sqlite_directory.failed");
    DirectoryError::Unavailable { reason: e.to_string() }
}

fn corrupt(e: impl std::fmt::Display) -> DirectoryError {
    DirectoryError::Corrupt { reason: e.to_string() }
}

impl UserDirectory for SqliteDirectory {
    async fn get_by_loyalty_id(&self, loyalty_id: &str) -> Result<Option<User>, DirectoryError> {
        let row = sqlx::query(
            "SELECT full_name, aliases, chat_username, chat_id, loyalty_id,
                    role, recent_visits, last_visit
             FROM users WHERE loyalty_id = ?",
        )
        .bind(loyalty_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        row.as_ref().map(|row| self.row_to_user(row)).transpose()
    }

    /// Upsert every user inside one transaction; a failure rolls back the
    /// whole batch.
    async fn save_all(&self, users: &[User]) -> Result<(), DirectoryError> {
        self.write_all(
            "INSERT OR REPLACE INTO users
             (full_name, aliases, chat_username, chat_id, loyalty_id, role,
              recent_visits, last_visit)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            users,
        )
        .await?;
        tracing::debug!(count = users.len(), "sqlite_directory.saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
