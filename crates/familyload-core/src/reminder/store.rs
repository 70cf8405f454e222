//! Immutable reminder store with derived indices.
//!
//! The store is a value, not a place: every mutating operation clones the
//! underlying maps and returns a new store, and the caller owns swapping
//! its reference. This keeps the engine trivially safe to call from any
//! number of threads as long as each caller holds its own store.
//!
//! Invariants maintained by every operation:
//! - `scheduled` holds exactly the ids whose reminder status is `Scheduled`
//! - `by_task` / `by_user` hold exactly the ids referencing that task/user
//!
//! The full-copy-per-mutation cost is O(n) and deliberate; at household
//! scale (tens of reminders per user) a persistent map structure is not
//! worth the dependency.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::{DeliveryStatus, Reminder};

/// Immutable aggregate of reminders plus derived lookup indices.
#[derive(Debug, Clone, Default)]
pub struct ReminderStore {
    reminders: HashMap<String, Reminder>,
    by_task: HashMap<String, HashSet<String>>,
    by_user: HashMap<String, HashSet<String>>,
    scheduled: HashSet<String>,
}

impl ReminderStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reminders in the store.
    pub fn len(&self) -> usize {
        self.reminders.len()
    }

    /// Whether the store holds no reminders.
    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }

    /// Insert a reminder, returning a new store.
    ///
    /// Inserting an id that already exists replaces the old record and
    /// repairs every index, including when the task or user changed.
    pub fn insert(&self, reminder: Reminder) -> ReminderStore {
        let mut next = self.clone();
        next.unindex(&reminder.id);
        next.index(&reminder);
        next.reminders.insert(reminder.id.clone(), reminder);
        next
    }

    /// Replace an existing reminder, returning a new store.
    ///
    /// Unknown ids are a no-op: the store comes back unchanged. Reminders
    /// are never created through `update`.
    pub fn update(&self, reminder: Reminder) -> ReminderStore {
        if !self.reminders.contains_key(&reminder.id) {
            return self.clone();
        }
        self.insert(reminder)
    }

    /// Look up a reminder by id.
    pub fn get(&self, id: &str) -> Option<&Reminder> {
        self.reminders.get(id)
    }

    /// All reminders referencing a task.
    pub fn by_task(&self, task_id: &str) -> Vec<&Reminder> {
        self.collect_ids(self.by_task.get(task_id))
    }

    /// All reminders targeting a user.
    pub fn by_user(&self, user_id: &str) -> Vec<&Reminder> {
        self.collect_ids(self.by_user.get(user_id))
    }

    /// All currently scheduled reminders, ascending by `scheduled_at`.
    ///
    /// The ordering is a hard contract: batch processing assumes
    /// earliest-due-first. Ties break on id so the order is deterministic.
    pub fn scheduled(&self) -> Vec<&Reminder> {
        let mut out: Vec<&Reminder> = self
            .scheduled
            .iter()
            .filter_map(|id| self.reminders.get(id))
            .collect();
        out.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// Scheduled reminders due at or before `now`, ascending order preserved.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<&Reminder> {
        self.scheduled()
            .into_iter()
            .filter(|r| r.scheduled_at <= now)
            .collect()
    }

    /// Scheduled reminders with `scheduled_at` in the inclusive [start, end] range.
    pub fn in_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Reminder> {
        self.scheduled()
            .into_iter()
            .filter(|r| r.scheduled_at >= start && r.scheduled_at <= end)
            .collect()
    }

    fn collect_ids(&self, ids: Option<&HashSet<String>>) -> Vec<&Reminder> {
        ids.map(|set| {
            let mut out: Vec<&Reminder> =
                set.iter().filter_map(|id| self.reminders.get(id)).collect();
            out.sort_by(|a, b| a.id.cmp(&b.id));
            out
        })
        .unwrap_or_default()
    }

    fn index(&mut self, reminder: &Reminder) {
        self.by_task
            .entry(reminder.task_id.clone())
            .or_default()
            .insert(reminder.id.clone());
        self.by_user
            .entry(reminder.user_id.clone())
            .or_default()
            .insert(reminder.id.clone());
        if reminder.delivery_status == DeliveryStatus::Scheduled {
            self.scheduled.insert(reminder.id.clone());
        }
    }

    fn unindex(&mut self, id: &str) {
        let Some(old) = self.reminders.get(id) else {
            return;
        };
        if let Some(set) = self.by_task.get_mut(&old.task_id) {
            set.remove(id);
            if set.is_empty() {
                self.by_task.remove(&old.task_id);
            }
        }
        if let Some(set) = self.by_user.get_mut(&old.user_id) {
            set.remove(id);
            if set.is_empty() {
                self.by_user.remove(&old.user_id);
            }
        }
        self.scheduled.remove(id);
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        for (id, r) in &self.reminders {
            assert_eq!(
                self.scheduled.contains(id),
                r.delivery_status == DeliveryStatus::Scheduled,
                "scheduled set out of sync for {id}"
            );
            assert!(self.by_task[&r.task_id].contains(id));
            assert!(self.by_user[&r.user_id].contains(id));
        }
        for (task, ids) in &self.by_task {
            for id in ids {
                assert_eq!(&self.reminders[id].task_id, task);
            }
        }
        for (user, ids) in &self.by_user {
            for id in ids {
                assert_eq!(&self.reminders[id].user_id, user);
            }
        }
        for id in &self.scheduled {
            assert!(self.reminders.contains_key(id));
        }
    }
}
