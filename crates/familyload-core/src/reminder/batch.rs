//! Batch processing of due reminders.
//!
//! An external scheduler calls [`process_batch`] periodically. The
//! processor finds everything due, applies each user's daily cap, holds
//! back anything inside quiet hours, and hands the caller per-user send
//! batches plus the updated store. The engine never performs I/O -- the
//! caller dispatches the batches and marks reminders sent afterwards.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use super::quiet_hours::{is_quiet_hours, next_send_time};
use super::store::ReminderStore;
use super::Reminder;
use crate::preferences::UserPreferences;

/// Hour of the local day that over-cap reminders are pushed to.
const DEFERRAL_HOUR: u32 = 9;

/// Reminders cleared for sending to one user this cycle.
#[derive(Debug, Clone)]
pub struct UserBatch {
    pub user_id: String,
    pub reminders: Vec<Reminder>,
}

/// Result of applying a per-user daily cap.
#[derive(Debug, Clone)]
pub struct DailyLimitSplit {
    pub allowed: Vec<Reminder>,
    pub deferred: Vec<Reminder>,
}

/// Outcome of one processing cycle.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Per-user reminders that passed both the cap and the quiet-hours check.
    pub batches: Vec<UserBatch>,
    /// Reminders pushed to a later time; the store already reflects the
    /// new `scheduled_at` for each.
    pub deferred: Vec<Reminder>,
    /// Store with every reschedule applied.
    pub store: ReminderStore,
}

/// Split `reminders` into the first `limit` by urgency and the rest.
///
/// Sort order is priority rank (urgent first), then ascending
/// `scheduled_at` among equals. The sort is stable, so insertion order
/// breaks remaining ties.
pub fn apply_daily_limit(mut reminders: Vec<Reminder>, limit: usize) -> DailyLimitSplit {
    reminders.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| a.scheduled_at.cmp(&b.scheduled_at))
    });
    let deferred = reminders.split_off(limit.min(reminders.len()));
    DailyLimitSplit {
        allowed: reminders,
        deferred,
    }
}

/// 09:00 local on the day after `now`, expressed in UTC.
fn next_day_deferral(now: DateTime<Utc>, prefs: &UserPreferences) -> DateTime<Utc> {
    let offset = prefs.utc_offset();
    let tomorrow = now.with_timezone(&offset).date_naive() + Duration::days(1);
    offset
        .with_ymd_and_hms(
            tomorrow.year(),
            tomorrow.month(),
            tomorrow.day(),
            DEFERRAL_HOUR,
            0,
            0,
        )
        .single()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now + Duration::days(1))
}

/// Run one processing cycle over the store as of `now`.
///
/// Users without an entry in `prefs_by_user` get [`UserPreferences::default`]
/// (10/day cap, no quiet hours, French content).
pub fn process_batch(
    store: &ReminderStore,
    prefs_by_user: &HashMap<String, UserPreferences>,
    now: DateTime<Utc>,
) -> BatchOutcome {
    // Group due reminders per user. BTreeMap keeps user order stable
    // across runs; within a user the earliest-due-first order from the
    // store is preserved.
    let mut per_user: BTreeMap<String, Vec<Reminder>> = BTreeMap::new();
    for reminder in store.due(now) {
        per_user
            .entry(reminder.user_id.clone())
            .or_default()
            .push(reminder.clone());
    }

    let default_prefs = UserPreferences::default();
    let mut next_store = store.clone();
    let mut batches = Vec::new();
    let mut deferred = Vec::new();

    for (user_id, due) in per_user {
        let prefs = prefs_by_user.get(&user_id).unwrap_or(&default_prefs);
        let split = apply_daily_limit(due, prefs.max_reminders_per_day);

        let mut sendable = Vec::new();
        for reminder in split.allowed {
            if is_quiet_hours(now, prefs) {
                // Quiet right now: push past the window instead of sending.
                let rescheduled = Reminder {
                    scheduled_at: next_send_time(now, prefs),
                    updated_at: now,
                    ..reminder
                };
                next_store = next_store.update(rescheduled.clone());
                deferred.push(rescheduled);
            } else {
                sendable.push(reminder);
            }
        }

        // Over the daily cap: tomorrow morning, local time.
        for reminder in split.deferred {
            let rescheduled = Reminder {
                scheduled_at: next_day_deferral(now, prefs),
                updated_at: now,
                ..reminder
            };
            next_store = next_store.update(rescheduled.clone());
            deferred.push(rescheduled);
        }

        if !sendable.is_empty() {
            batches.push(UserBatch {
                user_id,
                reminders: sendable,
            });
        }
    }

    BatchOutcome {
        batches,
        deferred,
        store: next_store,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::QuietHours;
    use crate::reminder::testutil::sample_reminder;
    use crate::reminder::{DeliveryStatus, ReminderPriority};
    use chrono::Timelike;

    fn reminder_at(
        id: &str,
        user: &str,
        priority: ReminderPriority,
        scheduled_at: DateTime<Utc>,
    ) -> Reminder {
        let mut r = sample_reminder(id, user, "t1");
        r.priority = priority;
        r.scheduled_at = scheduled_at;
        r
    }

    #[test]
    fn daily_limit_keeps_urgent_over_low() {
        let now = Utc::now();
        let reminders = vec![
            reminder_at("l1", "u1", ReminderPriority::Low, now - Duration::minutes(50)),
            reminder_at("u1a", "u1", ReminderPriority::Urgent, now - Duration::minutes(40)),
            reminder_at("u1b", "u1", ReminderPriority::Urgent, now - Duration::minutes(30)),
            reminder_at("l2", "u1", ReminderPriority::Low, now - Duration::minutes(20)),
            reminder_at("u1c", "u1", ReminderPriority::Urgent, now - Duration::minutes(10)),
        ];

        let split = apply_daily_limit(reminders, 3);

        let allowed: Vec<&str> = split.allowed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(allowed, vec!["u1a", "u1b", "u1c"]);

        let deferred: Vec<&str> = split.deferred.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(deferred, vec!["l1", "l2"]);
    }

    #[test]
    fn daily_limit_orders_equal_priority_by_time() {
        let now = Utc::now();
        let reminders = vec![
            reminder_at("b", "u1", ReminderPriority::High, now - Duration::minutes(5)),
            reminder_at("a", "u1", ReminderPriority::High, now - Duration::minutes(15)),
        ];

        let split = apply_daily_limit(reminders, 5);
        let allowed: Vec<&str> = split.allowed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(allowed, vec!["a", "b"]);
        assert!(split.deferred.is_empty());
    }

    #[test]
    fn process_batch_groups_per_user() {
        let now = Utc::now();
        let store = ReminderStore::new()
            .insert(reminder_at("r1", "alice", ReminderPriority::Medium, now - Duration::minutes(5)))
            .insert(reminder_at("r2", "bob", ReminderPriority::Medium, now - Duration::minutes(5)))
            .insert(reminder_at("r3", "alice", ReminderPriority::Medium, now - Duration::minutes(1)))
            // Future reminder stays out of the batch entirely.
            .insert(reminder_at("r4", "alice", ReminderPriority::Medium, now + Duration::hours(1)));

        let outcome = process_batch(&store, &HashMap::new(), now);

        assert_eq!(outcome.batches.len(), 2);
        let alice = outcome.batches.iter().find(|b| b.user_id == "alice").unwrap();
        assert_eq!(alice.reminders.len(), 2);
        let bob = outcome.batches.iter().find(|b| b.user_id == "bob").unwrap();
        assert_eq!(bob.reminders.len(), 1);
        assert!(outcome.deferred.is_empty());
    }

    #[test]
    fn process_batch_defers_over_cap_to_next_morning() {
        let now = Utc::now();
        let mut prefs = UserPreferences::default();
        prefs.max_reminders_per_day = 1;
        let mut prefs_map = HashMap::new();
        prefs_map.insert("u1".to_string(), prefs);

        let store = ReminderStore::new()
            .insert(reminder_at("keep", "u1", ReminderPriority::Urgent, now - Duration::minutes(10)))
            .insert(reminder_at("defer", "u1", ReminderPriority::Low, now - Duration::minutes(5)));

        let outcome = process_batch(&store, &prefs_map, now);

        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(outcome.batches[0].reminders[0].id, "keep");
        assert_eq!(outcome.deferred.len(), 1);

        let deferred = &outcome.deferred[0];
        assert_eq!(deferred.id, "defer");
        assert!(deferred.scheduled_at > now);
        assert_eq!(deferred.scheduled_at.hour(), DEFERRAL_HOUR);
        assert_eq!(deferred.scheduled_at.minute(), 0);

        // The store already carries the new time, still scheduled.
        let stored = outcome.store.get("defer").unwrap();
        assert_eq!(stored.scheduled_at, deferred.scheduled_at);
        assert_eq!(stored.delivery_status, DeliveryStatus::Scheduled);
    }

    #[test]
    fn process_batch_holds_everything_during_quiet_hours() {
        let now = Utc::now();
        let mut prefs = UserPreferences::default();
        // Window covering the whole day: always quiet.
        prefs.quiet_hours = Some(QuietHours {
            enabled: true,
            start: "00:00".to_string(),
            end: "23:59".to_string(),
        });
        let mut prefs_map = HashMap::new();
        prefs_map.insert("u1".to_string(), prefs);

        let store = ReminderStore::new().insert(reminder_at(
            "r1",
            "u1",
            ReminderPriority::High,
            now - Duration::minutes(5),
        ));

        let outcome = process_batch(&store, &prefs_map, now);

        assert!(outcome.batches.is_empty());
        assert_eq!(outcome.deferred.len(), 1);
        assert!(outcome.deferred[0].scheduled_at > now);
        assert_eq!(
            outcome.store.get("r1").unwrap().scheduled_at,
            outcome.deferred[0].scheduled_at
        );
    }

    #[test]
    fn process_batch_defaults_cap_without_prefs() {
        let now = Utc::now();
        let mut store = ReminderStore::new();
        for i in 0..12 {
            store = store.insert(reminder_at(
                &format!("r{i:02}"),
                "u1",
                ReminderPriority::Medium,
                now - Duration::minutes(60 - i),
            ));
        }

        let outcome = process_batch(&store, &HashMap::new(), now);

        assert_eq!(outcome.batches[0].reminders.len(), 10);
        assert_eq!(outcome.deferred.len(), 2);
    }
}
