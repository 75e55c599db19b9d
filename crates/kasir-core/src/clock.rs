//! Store-local calendar helpers.
//!
//! Ledger timestamps are stored in UTC; "today" and "this month" are
//! evaluated on the store's wall clock, given as a fixed UTC offset.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};

/// Western Indonesia Time, UTC+7.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 7 * 60;

/// Builds an offset from minutes east of UTC, falling back to UTC when out
/// of range.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// The store-local calendar date of `now`.
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// 00:00 store-local on `date`, as a UTC instant.
pub fn day_start(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local_midnight = date.and_time(NaiveTime::MIN);
    let utc = local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&utc)
}

/// Day 1 of the current store-local month at 00:00, as a UTC instant.
pub fn start_of_month(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let today = local_date(now, offset);
    let first = today.with_day(1).unwrap_or(today);
    day_start(first, offset)
}

/// Receipt number in store-local time: `INV-DDMMYYHHMM`.
pub fn invoice_number(now: DateTime<Utc>, offset: FixedOffset) -> String {
    format!("INV-{}", now.with_timezone(&offset).format("%d%m%y%H%M"))
}
