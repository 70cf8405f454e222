//! Quiet-hours window math.
//!
//! A quiet-hours window is a pair of "HH:MM" wall-clock strings in the
//! user's timezone. Windows where start > end wrap past midnight
//! (22:00 -> 07:00). Malformed fields degrade numerically to 0 rather
//! than erroring; preferences are caller-supplied and best-effort.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use crate::preferences::UserPreferences;

/// Minutes since local midnight for an "HH:MM" string.
///
/// Each half defaults to 0 when missing or unparseable, so "garbage"
/// behaves as "00:00".
fn minutes_of_day(hhmm: &str) -> u32 {
    let (hh, mm) = hhmm.split_once(':').unwrap_or((hhmm, ""));
    let hours: u32 = hh.trim().parse().unwrap_or(0);
    let minutes: u32 = mm.trim().parse().unwrap_or(0);
    (hours % 24) * 60 + minutes % 60
}

/// Whether `time` falls inside the user's quiet-hours window.
///
/// Always false when the window is absent or disabled.
pub fn is_quiet_hours(time: DateTime<Utc>, prefs: &UserPreferences) -> bool {
    let Some(window) = prefs.quiet_hours.as_ref() else {
        return false;
    };
    if !window.enabled {
        return false;
    }

    let local = time.with_timezone(&prefs.utc_offset());
    let current = local.hour() * 60 + local.minute();
    let start = minutes_of_day(&window.start);
    let end = minutes_of_day(&window.end);

    if start > end {
        // Overnight window, e.g. 22:00 -> 07:00.
        current >= start || current < end
    } else {
        current >= start && current < end
    }
}

/// Earliest acceptable send time at or after `proposed`.
///
/// Returns `proposed` unchanged outside quiet hours. Inside the window,
/// returns the next occurrence of the window's end time: same local day
/// if that is still ahead of `proposed`, otherwise rolled forward one
/// day (the overnight-wrap case, where the end time already passed
/// today's clock).
pub fn next_send_time(proposed: DateTime<Utc>, prefs: &UserPreferences) -> DateTime<Utc> {
    if !is_quiet_hours(proposed, prefs) {
        return proposed;
    }
    // is_quiet_hours returned true, so the window exists and is enabled.
    let Some(window) = prefs.quiet_hours.as_ref() else {
        return proposed;
    };

    let offset = prefs.utc_offset();
    let local = proposed.with_timezone(&offset);
    let end = minutes_of_day(&window.end);

    let mut candidate = offset
        .with_ymd_and_hms(
            local.date_naive().year(),
            local.date_naive().month(),
            local.date_naive().day(),
            end / 60,
            end % 60,
            0,
        )
        .single()
        .unwrap_or(local);
    if candidate <= local {
        candidate += Duration::days(1);
    }
    candidate.with_timezone(&Utc)
}
