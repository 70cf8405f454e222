//! Reminder records and their lifecycle.
//!
//! A reminder is one scheduled nudge about one task for one user. Records
//! are immutable: every transition returns a fresh `Reminder` and the
//! caller (usually a [`ReminderStore`]) decides what to do with it.
//!
//! ## Status transitions
//!
//! ```text
//! Scheduled -> Sent -> Delivered
//!     |          \-> Failed
//!     |-> Snoozed -> Scheduled (unsnooze)
//!     \-> Cancelled
//! ```

pub mod batch;
pub mod content;
pub mod factory;
pub mod priority;
pub mod quiet_hours;
pub mod store;

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use batch::{process_batch, BatchOutcome, DailyLimitSplit, UserBatch};
pub use content::build_reminder_content;
pub use factory::{
    create_check_in_reminder, create_deadline_reminder, create_overdue_reminder,
    create_recurring_reminder, create_reminder, ReminderParams,
};
pub use priority::derive_priority;
pub use quiet_hours::{is_quiet_hours, next_send_time};
pub use store::ReminderStore;

/// What triggered a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Deadline,
    Overdue,
    Recurring,
    FollowUp,
    CheckIn,
    Nudge,
    Celebration,
    WeeklySummary,
}

/// Urgency of a reminder, derived from its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl ReminderPriority {
    /// Sort rank: urgent first. Used by the daily-limit policy.
    pub fn rank(&self) -> u8 {
        match self {
            ReminderPriority::Urgent => 0,
            ReminderPriority::High => 1,
            ReminderPriority::Medium => 2,
            ReminderPriority::Low => 3,
        }
    }

    /// Lowercase wire form, also used in rendered content.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderPriority::Low => "low",
            ReminderPriority::Medium => "medium",
            ReminderPriority::High => "high",
            ReminderPriority::Urgent => "urgent",
        }
    }
}

/// Delivery state of a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Scheduled,
    Sent,
    Delivered,
    Failed,
    Cancelled,
    Snoozed,
}

/// Channel a reminder may go out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Push,
    Email,
    Sms,
    InApp,
}

/// Rendered reminder content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderContent {
    pub title: String,
    pub body: String,
    /// Deep link into the app, always `/tasks/{task_id}`.
    pub action_url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// One scheduled nudge about one task for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub household_id: String,
    pub reminder_type: ReminderType,
    pub priority: ReminderPriority,
    pub channels: Vec<DeliveryChannel>,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivery_status: DeliveryStatus,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub snooze_count: u32,
    pub content: ReminderContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// Mark as handed to the transport.
    pub fn mark_sent(&self, now: DateTime<Utc>) -> Reminder {
        Reminder {
            sent_at: Some(now),
            delivery_status: DeliveryStatus::Sent,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Mark as confirmed delivered. `sent_at` is left untouched.
    pub fn mark_delivered(&self, now: DateTime<Utc>) -> Reminder {
        Reminder {
            delivery_status: DeliveryStatus::Delivered,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Mark as failed to deliver.
    pub fn mark_failed(&self, now: DateTime<Utc>) -> Reminder {
        Reminder {
            delivery_status: DeliveryStatus::Failed,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Cancel the reminder.
    pub fn cancel(&self, now: DateTime<Utc>) -> Reminder {
        Reminder {
            delivery_status: DeliveryStatus::Cancelled,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Snooze for `duration_minutes`.
    ///
    /// Snoozing also overwrites `scheduled_at`: a snoozed reminder is a
    /// rescheduled reminder, the two are one state.
    pub fn snooze(&self, duration_minutes: i64, now: DateTime<Utc>) -> Reminder {
        let until = now + Duration::minutes(duration_minutes);
        Reminder {
            snoozed_until: Some(until),
            snooze_count: self.snooze_count + 1,
            delivery_status: DeliveryStatus::Snoozed,
            scheduled_at: until,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Clear a snooze and return to the scheduled state.
    ///
    /// `scheduled_at` keeps the snooze time; snoozing permanently
    /// reschedules (product decision, see DESIGN.md).
    pub fn unsnooze(&self, now: DateTime<Utc>) -> Reminder {
        Reminder {
            snoozed_until: None,
            delivery_status: DeliveryStatus::Scheduled,
            updated_at: now,
            ..self.clone()
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::task::{Task, TaskPriority, TaskStatus};

    pub(crate) fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            household_id: "h1".to_string(),
            assigned_to: Some("u1".to_string()),
            created_by: "u2".to_string(),
            title: "Ranger la chambre".to_string(),
            priority: TaskPriority::Medium,
            deadline: None,
            recurring: false,
            recurrence_pattern: None,
            status: TaskStatus::Pending,
            completed_at: None,
        }
    }

    pub(crate) fn sample_reminder(id: &str, user: &str, task: &str) -> Reminder {
        let now = Utc::now();
        Reminder {
            id: id.to_string(),
            task_id: task.to_string(),
            user_id: user.to_string(),
            household_id: "h1".to_string(),
            reminder_type: ReminderType::Deadline,
            priority: ReminderPriority::Medium,
            channels: vec![DeliveryChannel::Push],
            scheduled_at: now,
            sent_at: None,
            delivery_status: DeliveryStatus::Scheduled,
            snoozed_until: None,
            snooze_count: 0,
            content: ReminderContent {
                title: "t".to_string(),
                body: "b".to_string(),
                action_url: Some(format!("/tasks/{task}")),
                metadata: HashMap::new(),
            },
            created_at: now,
            updated_at: now,
        }
    }
}
