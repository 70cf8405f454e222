//! Task model consumed by the reminder engine.
//!
//! Tasks are owned by the household task service; this crate only reads
//! them to decide whether and when to nudge someone. Nothing here mutates
//! a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority assigned to a task by its creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task still needs attention (not completed or cancelled).
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

/// A household task as seen by the reminder engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub household_id: String,
    /// User the task is assigned to, if anyone.
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub title: String,
    pub priority: TaskPriority,
    pub deadline: Option<DateTime<Utc>>,
    /// Whether the task repeats on a schedule.
    pub recurring: bool,
    /// Recurrence pattern (e.g. "weekly:mon"), opaque to this crate.
    pub recurrence_pattern: Option<String>,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Whether the task's deadline has already passed as of `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => deadline < now && self.status.is_open(),
            None => false,
        }
    }
}
