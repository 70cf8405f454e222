//! Notification delivery queue.
//!
//! Outbound pushes are queued as SQLite rows and flushed by an external
//! scheduler calling [`NotificationQueue::process`]. The queue owns:
//! - aggregation-key deduplication at enqueue time
//! - the retry/backoff ladder (1 min, 5 min, 30 min, 2 h, saturating)
//! - invalid-token pruning against the device registry
//! - expiry, per-row claims, and aggregate counters
//!
//! A reminder becoming due is the usual enqueue source; see
//! [`NotificationQueue::queue_reminder`].

pub mod http;
pub mod transport;

pub use http::HttpPushTransport;
pub use transport::{PushMessage, PushTransport, TokenDelivery};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::reminder::Reminder;
use crate::storage::{NotificationStatus, QueueConfig, QueueDb, QueuedNotification};

/// Retry delays in seconds, indexed by `retry_count - 1` after the
/// increment. Attempts beyond the ladder saturate at the last entry.
const RETRY_BACKOFF_SECS: [i64; 4] = [60, 300, 1800, 7200];

fn retry_delay(retry_count: u32) -> Duration {
    let idx = (retry_count.saturating_sub(1) as usize).min(RETRY_BACKOFF_SECS.len() - 1);
    Duration::seconds(RETRY_BACKOFF_SECS[idx])
}

/// Title and body of an outbound notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

/// Per-call enqueue options.
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Dedupe key: while a pending row carries the same key, a second
    /// enqueue is suppressed.
    pub aggregation_key: Option<String>,
    /// Override of the configured retry budget.
    pub max_retries: Option<u32>,
    /// Rows past this instant are marked expired instead of attempted.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Aggregate counters from one processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub processed: u64,
    pub sent: u64,
    pub failed: u64,
    pub retrying: u64,
    pub expired: u64,
}

/// Persistence-backed queue of outbound push notifications.
pub struct NotificationQueue {
    db: QueueDb,
    config: QueueConfig,
    transport: Option<Box<dyn PushTransport>>,
}

impl NotificationQueue {
    /// Queue without a transport: enqueue/cancel/stats work, `process`
    /// is a no-op.
    pub fn new(db: QueueDb, config: QueueConfig) -> Self {
        Self {
            db,
            config,
            transport: None,
        }
    }

    /// Queue with a transport to dispatch through.
    pub fn with_transport(
        db: QueueDb,
        config: QueueConfig,
        transport: Box<dyn PushTransport>,
    ) -> Self {
        Self {
            db,
            config,
            transport: Some(transport),
        }
    }

    /// Access the underlying database (token and household upkeep).
    pub fn db(&self) -> &QueueDb {
        &self.db
    }

    /// Queue a push for one user.
    ///
    /// Returns `None` without inserting when the user has no active
    /// device token. With an aggregation key, an already-pending row
    /// carrying the same key suppresses the insert and its id is
    /// returned instead.
    pub fn queue_notification(
        &self,
        user_id: &str,
        content: &NotificationContent,
        payload: serde_json::Value,
        opts: &QueueOptions,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let tokens = self.db.active_tokens_for_user(user_id)?;
        if tokens.is_empty() {
            return Ok(None);
        }

        if let Some(key) = opts.aggregation_key.as_deref() {
            if let Some(existing) = self.db.find_pending_by_aggregation_key(key)? {
                log::debug!("suppressing duplicate notification for key {key}");
                return Ok(Some(existing.id));
            }
        }

        let notif_type = payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("general")
            .to_string();

        let row = QueuedNotification {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            notif_type,
            title: content.title.clone(),
            body: content.body.clone(),
            payload,
            tokens,
            retry_count: 0,
            max_retries: opts.max_retries.unwrap_or(self.config.default_max_retries),
            status: NotificationStatus::Pending,
            aggregation_key: opts.aggregation_key.clone(),
            expires_at: opts.expires_at,
            scheduled_for: now,
            processing_started_at: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_notification(&row)?;
        Ok(Some(row.id))
    }

    /// Queue a push for every active member of a household.
    ///
    /// The aggregation key, when present, is suffixed `{key}_{user_id}`
    /// so deduplication is per recipient, not household-wide. Members
    /// without tokens are skipped and contribute no id.
    pub fn queue_household_notification(
        &self,
        household_id: &str,
        content: &NotificationContent,
        payload: serde_json::Value,
        opts: &QueueOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let members = self.db.household_member_ids(household_id)?;
        let mut ids = Vec::new();
        for user_id in members {
            let member_opts = QueueOptions {
                aggregation_key: opts
                    .aggregation_key
                    .as_deref()
                    .map(|key| format!("{key}_{user_id}")),
                ..opts.clone()
            };
            if let Some(id) =
                self.queue_notification(&user_id, content, payload.clone(), &member_opts, now)?
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Queue the push for a due reminder.
    ///
    /// Payload carries the reminder/task references and the action URL;
    /// the aggregation key prevents a reminder from being queued twice
    /// while an earlier push for it is still pending.
    pub fn queue_reminder(&self, reminder: &Reminder, now: DateTime<Utc>) -> Result<Option<String>> {
        let content = NotificationContent {
            title: reminder.content.title.clone(),
            body: reminder.content.body.clone(),
        };
        let payload = serde_json::json!({
            "type": "reminder",
            "reminderId": reminder.id,
            "taskId": reminder.task_id,
            "actionUrl": reminder.content.action_url,
        });
        let opts = QueueOptions {
            aggregation_key: Some(format!("reminder_{}", reminder.id)),
            ..Default::default()
        };
        self.queue_notification(&reminder.user_id, &content, payload, &opts, now)
    }

    /// Flush due pending rows through the push transport.
    ///
    /// Returns the all-zero summary when no transport is configured.
    pub fn process(&self, now: DateTime<Utc>) -> Result<ProcessSummary> {
        let mut summary = ProcessSummary::default();
        let Some(transport) = self.transport.as_deref() else {
            return Ok(summary);
        };
        if !transport.is_configured() {
            return Ok(summary);
        }

        let stale_after = Duration::minutes(self.config.claim_stale_minutes);
        let rows = self.db.claim_due_pending(now, stale_after)?;

        for row in rows {
            summary.processed += 1;

            if row.expires_at.is_some_and(|exp| exp <= now) {
                self.db.mark_expired(&row.id, now)?;
                summary.expired += 1;
                continue;
            }

            let message = PushMessage {
                title: &row.title,
                body: &row.body,
                payload: &row.payload,
            };

            match transport.send(&row.tokens, &message) {
                Ok(deliveries) => {
                    self.prune_invalid_tokens(&row, &deliveries, now)?;
                    if deliveries.iter().any(|d| d.delivered) {
                        self.db.mark_sent(&row.id, now)?;
                        summary.sent += 1;
                    } else {
                        self.retry_or_fail(&row, now, &mut summary)?;
                    }
                }
                Err(err) => {
                    log::warn!(
                        "push transport '{}' failed for notification {}: {err}",
                        transport.name(),
                        row.id
                    );
                    self.retry_or_fail(&row, now, &mut summary)?;
                }
            }
        }
        Ok(summary)
    }

    /// Remove tokens the transport reported dead, from both the device
    /// registry and the row's remaining token list. A pruned token is
    /// not by itself a delivery failure.
    fn prune_invalid_tokens(
        &self,
        row: &QueuedNotification,
        deliveries: &[TokenDelivery],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let invalid: Vec<&str> = deliveries
            .iter()
            .filter(|d| d.invalid_token)
            .map(|d| d.token.as_str())
            .collect();
        if invalid.is_empty() {
            return Ok(());
        }

        for token in &invalid {
            self.db.delete_device_token(token)?;
            log::debug!("pruned invalid push token for user {}", row.user_id);
        }
        let remaining: Vec<String> = row
            .tokens
            .iter()
            .filter(|t| !invalid.contains(&t.as_str()))
            .cloned()
            .collect();
        self.db.update_tokens(&row.id, &remaining, now)?;
        Ok(())
    }

    fn retry_or_fail(
        &self,
        row: &QueuedNotification,
        now: DateTime<Utc>,
        summary: &mut ProcessSummary,
    ) -> Result<()> {
        if row.retry_count < row.max_retries {
            let next_count = row.retry_count + 1;
            let next_attempt = now + retry_delay(next_count);
            self.db
                .reschedule_retry(&row.id, next_count, next_attempt, now)?;
            summary.retrying += 1;
        } else {
            self.db.mark_failed(&row.id, now)?;
            summary.failed += 1;
            log::warn!(
                "notification {} exhausted its {} retries",
                row.id,
                row.max_retries
            );
        }
        Ok(())
    }

    /// Queue row counts by status.
    pub fn stats(&self) -> Result<crate::storage::QueueStats> {
        Ok(self.db.stats()?)
    }

    /// Delete terminal rows older than the configured retention window.
    /// Returns the number of rows deleted.
    pub fn cleanup_old(&self, now: DateTime<Utc>) -> Result<usize> {
        Ok(self.db.cleanup_old(self.config.retention_days, now)?)
    }

    /// Cancel one pending notification. Returns whether it existed.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        Ok(self.db.cancel(id)?)
    }

    /// Cancel a user's pending notifications, optionally by type.
    /// Returns the number cancelled.
    pub fn cancel_user(&self, user_id: &str, notif_type: Option<&str>) -> Result<usize> {
        Ok(self.db.cancel_user(user_id, notif_type)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DeviceToken;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted transport: per-token outcomes keyed by token, default
    /// success. Records every call.
    struct ScriptedTransport {
        outcomes: HashMap<String, (bool, bool)>, // (delivered, invalid)
        calls: Mutex<Vec<Vec<String>>>,
        fail_hard: bool,
    }

    impl ScriptedTransport {
        fn ok() -> Self {
            Self {
                outcomes: HashMap::new(),
                calls: Mutex::new(Vec::new()),
                fail_hard: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_hard: true,
                ..Self::ok()
            }
        }

        fn with_outcome(mut self, token: &str, delivered: bool, invalid: bool) -> Self {
            self.outcomes.insert(token.to_string(), (delivered, invalid));
            self
        }
    }

    impl PushTransport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn send(
            &self,
            tokens: &[String],
            _message: &PushMessage<'_>,
        ) -> Result<Vec<TokenDelivery>, Box<dyn std::error::Error>> {
            self.calls.lock().unwrap().push(tokens.to_vec());
            if self.fail_hard {
                return Err("relay unreachable".into());
            }
            Ok(tokens
                .iter()
                .map(|t| {
                    let (delivered, invalid) =
                        self.outcomes.get(t).copied().unwrap_or((true, false));
                    TokenDelivery {
                        token: t.clone(),
                        delivered,
                        invalid_token: invalid,
                    }
                })
                .collect())
        }
    }

    fn queue_with(transport: ScriptedTransport) -> NotificationQueue {
        let db = QueueDb::open_memory().unwrap();
        NotificationQueue::with_transport(db, QueueConfig::default(), Box::new(transport))
    }

    fn register_token(queue: &NotificationQueue, user: &str, token: &str) {
        queue
            .db()
            .upsert_device_token(&DeviceToken {
                token: token.to_string(),
                user_id: user.to_string(),
                platform: "android".to_string(),
                active: true,
            })
            .unwrap();
    }

    fn content() -> NotificationContent {
        NotificationContent {
            title: "Titre".to_string(),
            body: "Corps".to_string(),
        }
    }

    #[test]
    fn no_tokens_means_no_insert() {
        let queue = queue_with(ScriptedTransport::ok());
        let now = Utc::now();

        let id = queue
            .queue_notification("u1", &content(), serde_json::json!({}), &QueueOptions::default(), now)
            .unwrap();

        assert!(id.is_none());
        assert_eq!(queue.stats().unwrap().pending, 0);
    }

    #[test]
    fn type_defaults_to_general() {
        let queue = queue_with(ScriptedTransport::ok());
        let now = Utc::now();
        register_token(&queue, "u1", "tok-1");

        let id = queue
            .queue_notification("u1", &content(), serde_json::json!({}), &QueueOptions::default(), now)
            .unwrap()
            .unwrap();
        let row = queue.db().get_notification(&id).unwrap().unwrap();
        assert_eq!(row.notif_type, "general");

        let id = queue
            .queue_notification(
                "u1",
                &content(),
                serde_json::json!({"type": "chore"}),
                &QueueOptions::default(),
                now,
            )
            .unwrap()
            .unwrap();
        let row = queue.db().get_notification(&id).unwrap().unwrap();
        assert_eq!(row.notif_type, "chore");
    }

    #[test]
    fn aggregation_key_suppresses_duplicate() {
        let queue = queue_with(ScriptedTransport::ok());
        let now = Utc::now();
        register_token(&queue, "u1", "tok-1");

        let opts = QueueOptions {
            aggregation_key: Some("task_t1".to_string()),
            ..Default::default()
        };
        let first = queue
            .queue_notification("u1", &content(), serde_json::json!({}), &opts, now)
            .unwrap()
            .unwrap();
        let second = queue
            .queue_notification("u1", &content(), serde_json::json!({}), &opts, now)
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(queue.stats().unwrap().pending, 1);
    }

    #[test]
    fn household_keys_are_per_member() {
        let queue = queue_with(ScriptedTransport::ok());
        let now = Utc::now();
        queue.db().upsert_household_member("h1", "u1", true).unwrap();
        queue.db().upsert_household_member("h1", "u2", true).unwrap();
        queue.db().upsert_household_member("h1", "u3", true).unwrap();
        register_token(&queue, "u1", "tok-1");
        register_token(&queue, "u2", "tok-2");
        // u3 has no token and is skipped.

        let opts = QueueOptions {
            aggregation_key: Some("k".to_string()),
            ..Default::default()
        };
        let ids = queue
            .queue_household_notification("h1", &content(), serde_json::json!({}), &opts, now)
            .unwrap();

        assert_eq!(ids.len(), 2);
        let keys: Vec<Option<String>> = ids
            .iter()
            .map(|id| queue.db().get_notification(id).unwrap().unwrap().aggregation_key)
            .collect();
        assert!(keys.contains(&Some("k_u1".to_string())));
        assert!(keys.contains(&Some("k_u2".to_string())));
    }

    #[test]
    fn process_without_transport_is_noop() {
        let db = QueueDb::open_memory().unwrap();
        let queue = NotificationQueue::new(db, QueueConfig::default());
        let summary = queue.process(Utc::now()).unwrap();
        assert_eq!(summary, ProcessSummary::default());
    }

    #[test]
    fn process_sends_and_counts() {
        let queue = queue_with(ScriptedTransport::ok());
        let now = Utc::now();
        register_token(&queue, "u1", "tok-1");
        queue
            .queue_notification("u1", &content(), serde_json::json!({}), &QueueOptions::default(), now)
            .unwrap();

        let summary = queue.process(now).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(queue.stats().unwrap().sent, 1);
    }

    #[test]
    fn failure_below_budget_retries_with_first_backoff() {
        use chrono::Timelike;

        let queue = queue_with(ScriptedTransport::failing());
        // Whole-second instant so the stored timestamp round-trips exactly.
        let now = Utc::now().with_nanosecond(0).unwrap();
        register_token(&queue, "u1", "tok-1");
        let id = queue
            .queue_notification("u1", &content(), serde_json::json!({}), &QueueOptions::default(), now)
            .unwrap()
            .unwrap();

        let summary = queue.process(now).unwrap();
        assert_eq!(summary.retrying, 1);
        assert_eq!(summary.failed, 0);

        let row = queue.db().get_notification(&id).unwrap().unwrap();
        assert_eq!(row.retry_count, 1);
        assert_eq!(row.scheduled_for, now + Duration::seconds(60));
    }

    #[test]
    fn failure_at_budget_is_terminal() {
        let queue = queue_with(ScriptedTransport::failing());
        let now = Utc::now();
        register_token(&queue, "u1", "tok-1");
        let opts = QueueOptions {
            max_retries: Some(0),
            ..Default::default()
        };
        queue
            .queue_notification("u1", &content(), serde_json::json!({}), &opts, now)
            .unwrap();

        let summary = queue.process(now).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retrying, 0);
        assert_eq!(queue.stats().unwrap().failed, 1);
    }

    #[test]
    fn backoff_ladder_saturates() {
        assert_eq!(retry_delay(1), Duration::seconds(60));
        assert_eq!(retry_delay(2), Duration::seconds(300));
        assert_eq!(retry_delay(3), Duration::seconds(1800));
        assert_eq!(retry_delay(4), Duration::seconds(7200));
        assert_eq!(retry_delay(9), Duration::seconds(7200));
    }

    #[test]
    fn expired_rows_are_never_attempted() {
        let transport = ScriptedTransport::ok();
        let queue = queue_with(transport);
        let now = Utc::now();
        register_token(&queue, "u1", "tok-1");
        let opts = QueueOptions {
            expires_at: Some(now - Duration::minutes(1)),
            ..Default::default()
        };
        queue
            .queue_notification("u1", &content(), serde_json::json!({}), &opts, now)
            .unwrap();

        let summary = queue.process(now).unwrap();
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.sent, 0);
        assert_eq!(queue.stats().unwrap().expired, 1);
    }

    #[test]
    fn invalid_token_is_pruned_but_send_still_succeeds() {
        let transport = ScriptedTransport::ok()
            .with_outcome("tok-dead", false, true)
            .with_outcome("tok-live", true, false);
        let queue = queue_with(transport);
        let now = Utc::now();
        register_token(&queue, "u1", "tok-dead");
        register_token(&queue, "u1", "tok-live");

        let id = queue
            .queue_notification("u1", &content(), serde_json::json!({}), &QueueOptions::default(), now)
            .unwrap()
            .unwrap();

        let summary = queue.process(now).unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 0);

        // Registry and row token list both lost the dead token.
        assert_eq!(queue.db().active_tokens_for_user("u1").unwrap(), vec!["tok-live"]);
        let row = queue.db().get_notification(&id).unwrap().unwrap();
        assert_eq!(row.tokens, vec!["tok-live"]);
    }

    #[test]
    fn retry_waits_out_the_backoff() {
        let queue = queue_with(ScriptedTransport::failing());
        let now = Utc::now();
        register_token(&queue, "u1", "tok-1");
        queue
            .queue_notification("u1", &content(), serde_json::json!({}), &QueueOptions::default(), now)
            .unwrap();

        queue.process(now).unwrap();

        // Before the 60s backoff elapses the row is not due.
        let summary = queue.process(now + Duration::seconds(30)).unwrap();
        assert_eq!(summary.processed, 0);

        // After it elapses the row comes back, second backoff is 5 min.
        let summary = queue.process(now + Duration::seconds(61)).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.retrying, 1);
    }

    #[test]
    fn queue_reminder_carries_action_url_and_key() {
        let queue = queue_with(ScriptedTransport::ok());
        let now = Utc::now();
        register_token(&queue, "u1", "tok-1");

        let reminder = crate::reminder::testutil::sample_reminder("r9", "u1", "t9");
        let id = queue.queue_reminder(&reminder, now).unwrap().unwrap();

        let row = queue.db().get_notification(&id).unwrap().unwrap();
        assert_eq!(row.notif_type, "reminder");
        assert_eq!(row.payload["taskId"], "t9");
        assert_eq!(row.payload["actionUrl"], "/tasks/t9");
        assert_eq!(row.aggregation_key.as_deref(), Some("reminder_r9"));

        // Queueing the same reminder again while pending dedupes.
        let again = queue.queue_reminder(&reminder, now).unwrap().unwrap();
        assert_eq!(again, id);
    }
}
