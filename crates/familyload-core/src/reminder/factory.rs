//! Reminder construction.
//!
//! Constructors return `None` instead of scheduling into the past: a
//! deadline reminder whose lead window already elapsed simply does not
//! exist. The overdue constructor is the one exception -- it schedules
//! for "now" by definition.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{
    build_reminder_content, derive_priority, DeliveryStatus, Reminder, ReminderType,
};
use crate::preferences::UserPreferences;
use crate::task::Task;

/// Inputs for assembling one reminder.
pub struct ReminderParams<'a> {
    pub task: &'a Task,
    pub user_id: &'a str,
    pub reminder_type: ReminderType,
    pub scheduled_at: DateTime<Utc>,
    pub prefs: &'a UserPreferences,
    pub now: DateTime<Utc>,
}

/// Assemble a full reminder record in the scheduled state.
pub fn create_reminder(params: ReminderParams<'_>) -> Reminder {
    let ReminderParams {
        task,
        user_id,
        reminder_type,
        scheduled_at,
        prefs,
        now,
    } = params;

    let priority = derive_priority(task, now);
    let content = build_reminder_content(task, reminder_type, priority, &prefs.language);

    Reminder {
        id: Uuid::new_v4().to_string(),
        task_id: task.id.clone(),
        user_id: user_id.to_string(),
        household_id: task.household_id.clone(),
        reminder_type,
        priority,
        channels: prefs.channels.clone(),
        scheduled_at,
        sent_at: None,
        delivery_status: DeliveryStatus::Scheduled,
        snoozed_until: None,
        snooze_count: 0,
        content,
        created_at: now,
        updated_at: now,
    }
}

/// Reminder ahead of a task deadline, `lead_times.deadline_hours` early.
///
/// `None` when the task has no deadline, is closed, or the lead window
/// has already elapsed.
pub fn create_deadline_reminder(
    task: &Task,
    user_id: &str,
    prefs: &UserPreferences,
    now: DateTime<Utc>,
) -> Option<Reminder> {
    let deadline = task.deadline?;
    if !task.status.is_open() {
        return None;
    }
    let scheduled_at = deadline - Duration::hours(prefs.lead_times.deadline_hours);
    if scheduled_at <= now {
        return None;
    }
    Some(create_reminder(ReminderParams {
        task,
        user_id,
        reminder_type: ReminderType::Deadline,
        scheduled_at,
        prefs,
        now,
    }))
}

/// Immediate reminder for a task whose deadline has passed.
///
/// `None` unless the task has a deadline, is still open, and that
/// deadline is behind `now`.
pub fn create_overdue_reminder(
    task: &Task,
    user_id: &str,
    prefs: &UserPreferences,
    now: DateTime<Utc>,
) -> Option<Reminder> {
    let deadline = task.deadline?;
    if !task.status.is_open() || deadline >= now {
        return None;
    }
    Some(create_reminder(ReminderParams {
        task,
        user_id,
        reminder_type: ReminderType::Overdue,
        scheduled_at: now,
        prefs,
        now,
    }))
}

/// Reminder ahead of the next occurrence of a recurring task.
pub fn create_recurring_reminder(
    task: &Task,
    occurrence: DateTime<Utc>,
    user_id: &str,
    prefs: &UserPreferences,
    now: DateTime<Utc>,
) -> Option<Reminder> {
    if !task.recurring || !task.status.is_open() {
        return None;
    }
    let scheduled_at = occurrence - Duration::hours(prefs.lead_times.recurring_hours);
    if scheduled_at <= now {
        return None;
    }
    Some(create_reminder(ReminderParams {
        task,
        user_id,
        reminder_type: ReminderType::Recurring,
        scheduled_at,
        prefs,
        now,
    }))
}

/// Check-in reminder for a task that has sat with its assignee a while.
pub fn create_check_in_reminder(
    task: &Task,
    assigned_at: DateTime<Utc>,
    user_id: &str,
    prefs: &UserPreferences,
    now: DateTime<Utc>,
) -> Option<Reminder> {
    if task.assigned_to.is_none() || !task.status.is_open() {
        return None;
    }
    let scheduled_at = assigned_at + Duration::hours(prefs.lead_times.check_in_hours);
    if scheduled_at <= now {
        return None;
    }
    Some(create_reminder(ReminderParams {
        task,
        user_id,
        reminder_type: ReminderType::CheckIn,
        scheduled_at,
        prefs,
        now,
    }))
}
