use jiff::{civil::Date, tz::TimeZone, Timestamp};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar arithmetic failed: {0}")]
    Civil(#[from] jiff::Error),
    #[error("instant out of range: {0}")]
    Range(#[from] time::error::ComponentRange),
}

/// One local calendar day expressed as a half-open UTC interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayWindow {
    pub day_key: Date,
    pub start_utc: OffsetDateTime,
    pub end_utc: OffsetDateTime,
}

/// Civil date of `instant` as seen on a wall clock in `tz`.
pub fn day_key(instant: OffsetDateTime, tz: &TimeZone) -> Result<Date, CalendarError> {
    Ok(to_timestamp(instant)?.to_zoned(tz.clone()).date())
}

/// The local day containing `now_utc`, from its first instant up to the first
/// instant of the next day. Days around DST changes are 23 or 25 hours long.
pub fn day_window(now_utc: OffsetDateTime, tz: &TimeZone) -> Result<DayWindow, CalendarError> {
    let day_key = day_key(now_utc, tz)?;
    let start = day_key.to_zoned(tz.clone())?.timestamp();
    let end = day_key.tomorrow()?.to_zoned(tz.clone())?.timestamp();
    Ok(DayWindow {
        day_key,
        start_utc: from_timestamp(start)?,
        end_utc: from_timestamp(end)?,
    })
}

fn to_timestamp(instant: OffsetDateTime) -> Result<Timestamp, jiff::Error> {
    Timestamp::from_nanosecond(instant.unix_timestamp_nanos())
}

fn from_timestamp(ts: Timestamp) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(ts.as_nanosecond())
}
