//! Reminder priority derivation.
//!
//! Deadline proximity dominates everything except an explicitly urgent
//! task; without a pressing deadline the task's own priority decides,
//! one notch down.

use chrono::{DateTime, Duration, Utc};

use super::ReminderPriority;
use crate::task::{Task, TaskPriority};

/// Derive a reminder priority from a task as of `now`.
///
/// Order of checks:
/// 1. urgent task -> urgent reminder, deadline ignored
/// 2. deadline already past -> high
/// 3. deadline within 24h -> high, within 72h -> medium
/// 4. otherwise the task priority maps down (high -> medium, else low)
pub fn derive_priority(task: &Task, now: DateTime<Utc>) -> ReminderPriority {
    if task.priority == TaskPriority::Urgent {
        return ReminderPriority::Urgent;
    }

    if let Some(deadline) = task.deadline {
        if deadline <= now {
            return ReminderPriority::High;
        }
        let remaining = deadline - now;
        if remaining <= Duration::hours(24) {
            return ReminderPriority::High;
        }
        if remaining <= Duration::hours(72) {
            return ReminderPriority::Medium;
        }
    }

    match task.priority {
        TaskPriority::High => ReminderPriority::Medium,
        TaskPriority::Medium | TaskPriority::Low => ReminderPriority::Low,
        TaskPriority::Urgent => ReminderPriority::Urgent, // unreachable, handled above
    }
}
