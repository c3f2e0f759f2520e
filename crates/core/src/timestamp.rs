#![forbid(unsafe_code)]

//! Offset date-time stamps for `created` / `modified`.
//!
//! Stamps are always written in UTC with millisecond precision and a fixed
//! width, so their text order equals their chronological order.

use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};

const STAMP_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory]:[offset_minute]"
);

pub fn now() -> OffsetDateTime {
    truncate_to_millis(OffsetDateTime::now_utc())
}

pub fn truncate_to_millis(value: OffsetDateTime) -> OffsetDateTime {
    let sub_millis = i64::from(value.nanosecond() % 1_000_000);
    value - Duration::nanoseconds(sub_millis)
}

pub fn format(value: OffsetDateTime) -> String {
    let utc = truncate_to_millis(value.to_offset(UtcOffset::UTC));
    match utc.format(STAMP_FORMAT) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!("timestamp formatting failed, falling back to rfc3339: {err}");
            utc.format(&Rfc3339).unwrap_or_default()
        }
    }
}

pub fn parse(value: &str) -> Option<OffsetDateTime> {
    match OffsetDateTime::parse(value.trim(), &Rfc3339) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::debug!(value, "unparseable timestamp: {err}");
            None
        }
    }
}

/// A stamp strictly after `previous`, normally the current time.
pub fn after(previous: Option<OffsetDateTime>) -> OffsetDateTime {
    let current = now();
    match previous {
        Some(previous) if current <= previous => {
            truncate_to_millis(previous) + Duration::milliseconds(1)
        }
        _ => current,
    }
}
