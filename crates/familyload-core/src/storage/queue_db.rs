//! SQLite-based storage for the notification queue.
//!
//! Three tables:
//! - `notification_queue`: outbound pushes with retry state
//! - `device_tokens`: push tokens per user
//! - `household_members`: household -> member resolution
//!
//! Rows are claimed for processing by stamping `processing_started_at`;
//! a claim older than the staleness timeout may be stolen by another
//! processor. This is what keeps two overlapping processing passes from
//! double-sending the same row.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::data_dir;

// === Helper Functions ===

/// Format a timestamp for storage.
///
/// Fixed-width millisecond precision with a literal Z suffix, so that
/// lexicographic comparison in SQL matches chronological order.
fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Delivery state of a queued notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Expired,
}

/// Parse notification status from database string
fn parse_status(status_str: &str) -> NotificationStatus {
    match status_str {
        "sent" => NotificationStatus::Sent,
        "failed" => NotificationStatus::Failed,
        "expired" => NotificationStatus::Expired,
        _ => NotificationStatus::Pending,
    }
}

/// Format notification status for database storage
fn format_status(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::Pending => "pending",
        NotificationStatus::Sent => "sent",
        NotificationStatus::Failed => "failed",
        NotificationStatus::Expired => "expired",
    }
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_datetime_opt(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str.map(|s| parse_datetime_fallback(&s))
}

/// Build a QueuedNotification from a database row.
///
/// Column order must match `SELECT_COLUMNS`.
fn row_to_notification(row: &rusqlite::Row) -> Result<QueuedNotification, rusqlite::Error> {
    let payload_str: String = row.get(5)?;
    let tokens_str: String = row.get(6)?;
    let status_str: String = row.get(9)?;
    let scheduled_for_str: String = row.get(12)?;
    let created_at_str: String = row.get(14)?;
    let updated_at_str: String = row.get(15)?;

    Ok(QueuedNotification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        notif_type: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        tokens: serde_json::from_str(&tokens_str).unwrap_or_default(),
        retry_count: row.get(7)?,
        max_retries: row.get(8)?,
        status: parse_status(&status_str),
        aggregation_key: row.get(10)?,
        expires_at: parse_datetime_opt(row.get(11)?),
        scheduled_for: parse_datetime_fallback(&scheduled_for_str),
        processing_started_at: parse_datetime_opt(row.get(13)?),
        created_at: parse_datetime_fallback(&created_at_str),
        updated_at: parse_datetime_fallback(&updated_at_str),
    })
}

const SELECT_COLUMNS: &str = "id, user_id, notif_type, title, body, payload, tokens, \
     retry_count, max_retries, status, aggregation_key, expires_at, \
     scheduled_for, processing_started_at, created_at, updated_at";

/// One outbound push notification in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub id: String,
    pub user_id: String,
    pub notif_type: String,
    pub title: String,
    pub body: String,
    /// Arbitrary JSON payload forwarded to the push transport.
    pub payload: serde_json::Value,
    /// Device tokens still targeted; invalid ones are pruned over time.
    pub tokens: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: NotificationStatus,
    pub aggregation_key: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Earliest time the row may be attempted (now + backoff on retries).
    pub scheduled_for: DateTime<Utc>,
    /// Claim stamp; set while a processor holds the row.
    pub processing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered push token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToken {
    pub token: String,
    pub user_id: String,
    pub platform: String,
    pub active: bool,
}

/// Queue row counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub sent: u64,
    pub failed: u64,
    pub expired: u64,
}

/// SQLite database for the notification queue.
pub struct QueueDb {
    conn: Connection,
}

impl QueueDb {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/familyload/familyload.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("familyload.db");
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open the database at a specific path.
    pub fn open_at(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and ephemeral embedding).
    pub fn open_memory() -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS notification_queue (
                id                    TEXT PRIMARY KEY,
                user_id               TEXT NOT NULL,
                notif_type            TEXT NOT NULL DEFAULT 'general',
                title                 TEXT NOT NULL,
                body                  TEXT NOT NULL,
                payload               TEXT NOT NULL DEFAULT '{}',
                tokens                TEXT NOT NULL DEFAULT '[]',
                retry_count           INTEGER NOT NULL DEFAULT 0,
                max_retries           INTEGER NOT NULL DEFAULT 3,
                status                TEXT NOT NULL DEFAULT 'pending',
                aggregation_key       TEXT,
                expires_at            TEXT,
                scheduled_for         TEXT NOT NULL,
                processing_started_at TEXT,
                created_at            TEXT NOT NULL,
                updated_at            TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS device_tokens (
                token    TEXT PRIMARY KEY,
                user_id  TEXT NOT NULL,
                platform TEXT NOT NULL DEFAULT 'unknown',
                active   INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS household_members (
                household_id TEXT NOT NULL,
                user_id      TEXT NOT NULL,
                active       INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (household_id, user_id)
            );

            -- Create indexes for common query patterns
            CREATE INDEX IF NOT EXISTS idx_queue_status_scheduled
                ON notification_queue(status, scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_queue_aggregation
                ON notification_queue(aggregation_key);
            CREATE INDEX IF NOT EXISTS idx_queue_user
                ON notification_queue(user_id);
            CREATE INDEX IF NOT EXISTS idx_device_tokens_user
                ON device_tokens(user_id);",
        )?;
        Ok(())
    }

    // === Notification queue rows ===

    /// Insert a new queue row.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn insert_notification(&self, n: &QueuedNotification) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO notification_queue
                (id, user_id, notif_type, title, body, payload, tokens,
                 retry_count, max_retries, status, aggregation_key, expires_at,
                 scheduled_for, processing_started_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                n.id,
                n.user_id,
                n.notif_type,
                n.title,
                n.body,
                n.payload.to_string(),
                serde_json::to_string(&n.tokens).unwrap_or_else(|_| "[]".to_string()),
                n.retry_count,
                n.max_retries,
                format_status(n.status),
                n.aggregation_key,
                n.expires_at.map(fmt_ts),
                fmt_ts(n.scheduled_for),
                n.processing_started_at.map(fmt_ts),
                fmt_ts(n.created_at),
                fmt_ts(n.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Look up one queue row by id.
    pub fn get_notification(
        &self,
        id: &str,
    ) -> Result<Option<QueuedNotification>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM notification_queue WHERE id = ?1"),
                params![id],
                row_to_notification,
            )
            .optional()
    }

    /// Find a pending row carrying this exact aggregation key.
    pub fn find_pending_by_aggregation_key(
        &self,
        key: &str,
    ) -> Result<Option<QueuedNotification>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM notification_queue
                     WHERE aggregation_key = ?1 AND status = 'pending'
                     LIMIT 1"
                ),
                params![key],
                row_to_notification,
            )
            .optional()
    }

    /// Claim every due pending row and return it.
    ///
    /// A row is due when `scheduled_for <= now` and either unclaimed or
    /// claimed longer than `stale_after` ago. Claiming stamps
    /// `processing_started_at = now` atomically, so a second concurrent
    /// call sees nothing until the claims go stale.
    pub fn claim_due_pending(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Vec<QueuedNotification>, rusqlite::Error> {
        let stale_cutoff = now - stale_after;
        let mut stmt = self.conn.prepare(&format!(
            "UPDATE notification_queue
             SET processing_started_at = ?1
             WHERE status = 'pending'
               AND scheduled_for <= ?2
               AND (processing_started_at IS NULL OR processing_started_at <= ?3)
             RETURNING {SELECT_COLUMNS}"
        ))?;
        let rows = stmt.query_map(
            params![
                fmt_ts(now),
                fmt_ts(now),
                fmt_ts(stale_cutoff)
            ],
            row_to_notification,
        )?;

        let mut claimed: Vec<QueuedNotification> = rows.collect::<Result<_, _>>()?;
        claimed.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(claimed)
    }

    /// Mark a row sent and release its claim.
    pub fn mark_sent(&self, id: &str, now: DateTime<Utc>) -> Result<(), rusqlite::Error> {
        self.set_terminal_status(id, NotificationStatus::Sent, now)
    }

    /// Mark a row permanently failed and release its claim.
    pub fn mark_failed(&self, id: &str, now: DateTime<Utc>) -> Result<(), rusqlite::Error> {
        self.set_terminal_status(id, NotificationStatus::Failed, now)
    }

    /// Mark a row expired and release its claim.
    pub fn mark_expired(&self, id: &str, now: DateTime<Utc>) -> Result<(), rusqlite::Error> {
        self.set_terminal_status(id, NotificationStatus::Expired, now)
    }

    fn set_terminal_status(
        &self,
        id: &str,
        status: NotificationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE notification_queue
             SET status = ?1, processing_started_at = NULL, updated_at = ?2
             WHERE id = ?3",
            params![format_status(status), fmt_ts(now), id],
        )?;
        Ok(())
    }

    /// Bump the retry counter and push the row to a later attempt,
    /// releasing the claim.
    pub fn reschedule_retry(
        &self,
        id: &str,
        retry_count: u32,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE notification_queue
             SET retry_count = ?1, scheduled_for = ?2,
                 processing_started_at = NULL, updated_at = ?3
             WHERE id = ?4",
            params![retry_count, fmt_ts(scheduled_for), fmt_ts(now), id],
        )?;
        Ok(())
    }

    /// Replace a row's remaining token list (after invalid-token pruning).
    pub fn update_tokens(
        &self,
        id: &str,
        tokens: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE notification_queue SET tokens = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                serde_json::to_string(tokens).unwrap_or_else(|_| "[]".to_string()),
                fmt_ts(now),
                id
            ],
        )?;
        Ok(())
    }

    /// Queue row counts by status; all zero when the table is empty.
    pub fn stats(&self) -> Result<QueueStats, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM notification_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut stats = QueueStats::default();
        for row in rows {
            let (status, count) = row?;
            match parse_status(&status) {
                NotificationStatus::Pending => stats.pending += count,
                NotificationStatus::Sent => stats.sent += count,
                NotificationStatus::Failed => stats.failed += count,
                NotificationStatus::Expired => stats.expired += count,
            }
        }
        Ok(stats)
    }

    /// Delete terminal rows older than the retention window.
    ///
    /// Pending rows are never cleaned up, whatever their age.
    pub fn cleanup_old(
        &self,
        retention_days: i64,
        now: DateTime<Utc>,
    ) -> Result<usize, rusqlite::Error> {
        let cutoff = now - Duration::days(retention_days);
        self.conn.execute(
            "DELETE FROM notification_queue
             WHERE created_at < ?1 AND status != 'pending'",
            params![fmt_ts(cutoff)],
        )
    }

    /// Delete one pending row. Returns whether anything was deleted.
    pub fn cancel(&self, id: &str) -> Result<bool, rusqlite::Error> {
        let deleted = self.conn.execute(
            "DELETE FROM notification_queue WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        Ok(deleted > 0)
    }

    /// Delete a user's pending rows, optionally narrowed by type.
    /// Returns the number of rows deleted.
    pub fn cancel_user(
        &self,
        user_id: &str,
        notif_type: Option<&str>,
    ) -> Result<usize, rusqlite::Error> {
        match notif_type {
            Some(t) => self.conn.execute(
                "DELETE FROM notification_queue
                 WHERE user_id = ?1 AND status = 'pending' AND notif_type = ?2",
                params![user_id, t],
            ),
            None => self.conn.execute(
                "DELETE FROM notification_queue
                 WHERE user_id = ?1 AND status = 'pending'",
                params![user_id],
            ),
        }
    }

    // === Device tokens ===

    /// Register or update a device token.
    pub fn upsert_device_token(&self, token: &DeviceToken) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO device_tokens (token, user_id, platform, active)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(token) DO UPDATE SET
                 user_id = excluded.user_id,
                 platform = excluded.platform,
                 active = excluded.active",
            params![token.token, token.user_id, token.platform, token.active],
        )?;
        Ok(())
    }

    /// Active push tokens for one user.
    pub fn active_tokens_for_user(&self, user_id: &str) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT token FROM device_tokens
             WHERE user_id = ?1 AND active = 1
             ORDER BY token",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    /// Remove a token the transport reported invalid.
    pub fn delete_device_token(&self, token: &str) -> Result<bool, rusqlite::Error> {
        let deleted = self
            .conn
            .execute("DELETE FROM device_tokens WHERE token = ?1", params![token])?;
        Ok(deleted > 0)
    }

    // === Household members ===

    /// Add or update a household membership.
    pub fn upsert_household_member(
        &self,
        household_id: &str,
        user_id: &str,
        active: bool,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO household_members (household_id, user_id, active)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(household_id, user_id) DO UPDATE SET active = excluded.active",
            params![household_id, user_id, active],
        )?;
        Ok(())
    }

    /// Active member user ids of a household.
    pub fn household_member_ids(&self, household_id: &str) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id FROM household_members
             WHERE household_id = ?1 AND active = 1
             ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![household_id], |row| row.get::<_, String>(0))?;
        rows.collect()
    }
}
