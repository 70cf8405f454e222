//! # FamilyLoad Core Library
//!
//! This library provides the reminder scheduling and notification
//! delivery core for FamilyLoad, the household task manager. It is
//! invoked as a library from HTTP handlers and scheduled jobs; it owns
//! no routing, no UI and no wire protocol.
//!
//! ## Architecture
//!
//! - **Reminder Engine**: pure functions over an immutable store. An
//!   external scheduler periodically calls `process_batch()` to collect
//!   due reminders, capped per user per day and held back during each
//!   user's quiet hours.
//! - **Notification Queue**: SQLite-backed queue of outbound pushes with
//!   aggregation-key deduplication, a fixed retry backoff ladder, and
//!   invalid-token pruning against the device registry.
//! - **Storage**: SQLite queue/token/household tables and TOML-based
//!   configuration.
//!
//! ## Key Components
//!
//! - [`ReminderStore`]: immutable reminder aggregate with derived indices
//! - [`process_batch`]: one scheduling cycle over the store
//! - [`NotificationQueue`]: enqueue, flush and retry outbound pushes
//! - [`PushTransport`]: seam to the platform push relay

pub mod error;
pub mod preferences;
pub mod queue;
pub mod reminder;
pub mod storage;
pub mod task;

pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use preferences::{QuietHours, ReminderLeadTimes, UserPreferences};
pub use queue::{
    HttpPushTransport, NotificationContent, NotificationQueue, ProcessSummary, PushMessage,
    PushTransport, QueueOptions, TokenDelivery,
};
pub use reminder::{
    process_batch, BatchOutcome, DeliveryChannel, DeliveryStatus, Reminder, ReminderContent,
    ReminderPriority, ReminderStore, ReminderType, UserBatch,
};
pub use storage::{
    DeviceToken, NotificationStatus, QueueConfig, QueueDb, QueueStats, QueuedNotification,
};
pub use task::{Task, TaskPriority, TaskStatus};
