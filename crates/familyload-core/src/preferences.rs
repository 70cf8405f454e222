//! Per-user notification preferences.
//!
//! Preferences are owned by the user-settings service; the engine only
//! reads them. Every field carries a serde default so a partial or missing
//! record degrades to sensible behavior (10 reminders/day, no quiet hours,
//! French copy) instead of failing.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::reminder::DeliveryChannel;

/// Quiet-hours window during which nothing is dispatched immediately.
///
/// Start and end are wall-clock "HH:MM" strings in the user's timezone.
/// A window with start > end wraps past midnight (e.g. 22:00 -> 07:00).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHours {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_quiet_start")]
    pub start: String,
    #[serde(default = "default_quiet_end")]
    pub end: String,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_quiet_start(),
            end: default_quiet_end(),
        }
    }
}

/// Lead times, in hours, for each reminder trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderLeadTimes {
    /// Hours before a deadline to send the deadline reminder.
    #[serde(default = "default_deadline_hours")]
    pub deadline_hours: i64,
    /// Hours before a recurring occurrence.
    #[serde(default = "default_recurring_hours")]
    pub recurring_hours: i64,
    /// Hours after assignment before checking in on a stalled task.
    #[serde(default = "default_check_in_hours")]
    pub check_in_hours: i64,
}

impl Default for ReminderLeadTimes {
    fn default() -> Self {
        Self {
            deadline_hours: default_deadline_hours(),
            recurring_hours: default_recurring_hours(),
            check_in_hours: default_check_in_hours(),
        }
    }
}

/// Notification preferences for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Channels the user has opted into.
    #[serde(default = "default_channels")]
    pub channels: Vec<DeliveryChannel>,
    /// Optional quiet-hours window.
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
    /// Timezone as "UTC", "UTC+02:00" or "+02:00". Unparseable values
    /// fall back to UTC.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Content language ("fr", "en").
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub lead_times: ReminderLeadTimes,
    /// Hard cap on reminders delivered in one processing day.
    #[serde(default = "default_max_per_day")]
    pub max_reminders_per_day: usize,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            quiet_hours: None,
            timezone: default_timezone(),
            language: default_language(),
            lead_times: ReminderLeadTimes::default(),
            max_reminders_per_day: default_max_per_day(),
        }
    }
}

impl UserPreferences {
    /// The user's UTC offset, parsed from the `timezone` field.
    ///
    /// Accepts "UTC", "UTC±HH:MM" and bare "±HH:MM". Anything else
    /// (including IANA names, which we do not resolve) maps to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        parse_utc_offset(&self.timezone).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }
}

fn parse_utc_offset(tz: &str) -> Option<FixedOffset> {
    let tz = tz.trim();
    if tz.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let rest = tz.strip_prefix("UTC").unwrap_or(tz);
    let (sign, hhmm) = match rest.as_bytes().first()? {
        b'+' => (1i32, &rest[1..]),
        b'-' => (-1i32, &rest[1..]),
        _ => return None,
    };
    let (hh, mm) = hhmm.split_once(':')?;
    let hours: i32 = hh.parse().ok()?;
    let minutes: i32 = mm.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn default_quiet_start() -> String {
    "22:00".to_string()
}
fn default_quiet_end() -> String {
    "07:00".to_string()
}
fn default_deadline_hours() -> i64 {
    24
}
fn default_recurring_hours() -> i64 {
    2
}
fn default_check_in_hours() -> i64 {
    48
}
fn default_channels() -> Vec<DeliveryChannel> {
    vec![DeliveryChannel::Push, DeliveryChannel::InApp]
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_language() -> String {
    "fr".to_string()
}
fn default_max_per_day() -> usize {
    10
}
