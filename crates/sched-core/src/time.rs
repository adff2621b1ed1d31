//! Minute-resolution timestamps.
//!
//! Task times are stored as [`TimeInt`], whole minutes since the Unix epoch.
//! Users read and write them as local time in the `YYYY/MM/DD hh:mm` layout.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Minutes since 1970-01-01T00:00Z.
pub type TimeInt = u32;

/// Text layout used for input and display.
pub const TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Current time, truncated to the minute.
pub fn now() -> TimeInt {
    from_unix_seconds(Utc::now().timestamp())
}

/// Convert Unix seconds to a [`TimeInt`], clamping to the representable range.
pub fn from_unix_seconds(seconds: i64) -> TimeInt {
    let minutes = seconds.div_euclid(60);
    minutes.clamp(0, i64::from(TimeInt::MAX)) as TimeInt
}

pub fn to_unix_seconds(time: TimeInt) -> i64 {
    i64::from(time) * 60
}

/// Parse `YYYY/MM/DD hh:mm` as local time.
///
/// Returns `None` for malformed text, for local times skipped by a DST
/// transition, and for dates outside the [`TimeInt`] range.
pub fn parse_time(text: &str) -> Option<TimeInt> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), TIME_FORMAT).ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    let minutes = local.timestamp().div_euclid(60);
    TimeInt::try_from(minutes).ok()
}

/// Render a [`TimeInt`] as local `YYYY/MM/DD hh:mm`.
pub fn format_time(time: TimeInt) -> String {
    match DateTime::<Utc>::from_timestamp(to_unix_seconds(time), 0) {
        Some(utc) => utc.with_timezone(&Local).format(TIME_FORMAT).to_string(),
        None => String::from("????/??/?? ??:??"),
    }
}
