//! Wall-clock parsing and DST-aware local-to-UTC conversion.
//!
//! The conversion looks the UTC offset up for the zone *on the forecast
//! date*, not "now": an arrive-by stored in winter must still produce the
//! correct UTC instant in summer. Unknown zones fall back to treating the
//! local time as UTC with a warning, which is at most a one-hour error for
//! the next run and preferable to dropping the route.

use chrono::offset::LocalResult;
use chrono::{NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;

use crate::error::{CoreError, Result};

/// Minutes in a day.
const DAY_MINS: i32 = 24 * 60;

/// Parse `"HH:MM"` into minutes past midnight.
///
/// # Errors
///
/// Returns `CoreError::InvalidTimeOfDay` unless the value is a zero-padded
/// 24-hour wall-clock time.
pub fn parse_hhmm(value: &str) -> Result<u32> {
    let invalid = || CoreError::InvalidTimeOfDay {
        value: value.to_string(),
    };
    let (h, m) = value.split_once(':').ok_or_else(invalid)?;
    if h.len() != 2 || m.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok(hour * 60 + minute)
}

/// Format minutes past midnight as `"HH:MM"`.
#[must_use]
pub fn format_hhmm(total_mins: u32) -> String {
    format!("{:02}:{:02}", (total_mins / 60) % 24, total_mins % 60)
}

/// UTC offset in minutes for `zone` at the given local wall-clock on `date`.
///
/// Ambiguous local times (DST fall-back) resolve to the earliest instant;
/// nonexistent ones (spring-forward gap) resolve through the offset in
/// effect just before the transition. Returns `None` for unknown zones.
fn utc_offset_mins(zone: &str, date: NaiveDate, local_mins: u32) -> Option<i32> {
    let tz: Tz = zone.parse().ok()?;
    let naive = date.and_hms_opt(local_mins / 60, local_mins % 60, 0)?;
    let offset = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.offset().fix(),
        // Spring-forward gap: the midnight offset predates the jump.
        LocalResult::None => {
            let midnight = date.and_hms_opt(0, 0, 0)?;
            match tz.from_local_datetime(&midnight) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.offset().fix(),
                LocalResult::None => return None,
            }
        }
    };
    Some(offset.local_minus_utc() / 60)
}

/// Convert a local wall-clock time to UTC minutes past midnight for `date`.
///
/// The result is normalised modulo 1440, so the UTC wall-clock may belong
/// to the previous or next calendar day; callers anchor it later.
#[must_use]
pub fn local_mins_to_utc(local_mins: u32, zone: &str, date: NaiveDate) -> u32 {
    let Some(offset_mins) = utc_offset_mins(zone, date, local_mins) else {
        tracing::warn!(zone, "unknown timezone, using local time as UTC");
        return local_mins;
    };
    #[allow(clippy::cast_sign_loss)]
    let utc = (i32::try_from(local_mins).unwrap_or(0) - offset_mins).rem_euclid(DAY_MINS) as u32;
    utc
}

/// Convert a local `"HH:MM"` to the UTC `"HH:MM"` in effect on `date`.
///
/// # Errors
///
/// Returns an error when `local` is not a valid `HH:MM` time.
pub fn local_time_to_utc(local: &str, zone: &str, date: NaiveDate) -> Result<String> {
    let mins = parse_hhmm(local)?;
    Ok(format_hhmm(local_mins_to_utc(mins, zone, date)))
}
