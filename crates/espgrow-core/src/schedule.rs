//! Wall-clock translation for schedule rules.
//!
//! The controller evaluates schedules in UTC and stores `HH:MM` strings in
//! UTC. The rule mirror holds local wall-clock times and converts at the
//! sync boundary. Only hour and minute matter; the date used to resolve
//! the zone's offset is the date of the conversion instant, so a time
//! converted near a DST transition can be off by an hour for the other
//! half of the year.

use chrono::{DateTime, Duration, FixedOffset, Local, LocalResult, NaiveTime, Offset, TimeZone, Utc};

use crate::error::CoreError;

const TIME_FORMAT: &str = "%H:%M";

/// Zone the local side of a schedule is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleZone {
    /// The host's local zone, DST included.
    Local,
    /// A fixed offset from UTC.
    Fixed(FixedOffset),
}

impl ScheduleZone {
    /// Fixed zone from an offset in minutes east of UTC (`-300` is UTC-5).
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::Fixed)
    }

    /// Local `HH:MM` -> UTC `HH:MM`, resolved against `now`'s date.
    pub fn local_to_utc(&self, local: &str, now: DateTime<Utc>) -> Result<String, CoreError> {
        let time = parse_hhmm(local)?;
        let utc = match self {
            Self::Local => local_to_utc_in(&Local, time, now),
            Self::Fixed(offset) => local_to_utc_in(offset, time, now),
        };
        Ok(utc.format(TIME_FORMAT).to_string())
    }

    /// UTC `HH:MM` -> local `HH:MM`, resolved against `now`'s date.
    pub fn utc_to_local(&self, utc: &str, now: DateTime<Utc>) -> Result<String, CoreError> {
        let time = parse_hhmm(utc)?;
        let local = match self {
            Self::Local => utc_to_local_in(&Local, time, now),
            Self::Fixed(offset) => utc_to_local_in(offset, time, now),
        };
        Ok(local.format(TIME_FORMAT).to_string())
    }
}

fn parse_hhmm(value: &str) -> Result<NaiveTime, CoreError> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT).map_err(|e| {
        CoreError::ValidationFailed {
            message: format!("invalid schedule time '{value}' (expected HH:MM): {e}"),
        }
    })
}

fn local_to_utc_in<Tz: TimeZone>(tz: &Tz, time: NaiveTime, now: DateTime<Utc>) -> NaiveTime {
    let naive = now.with_timezone(tz).date_naive().and_time(time);

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc).time(),
        // Skipped by a DST jump: apply the offset in force at `now`.
        LocalResult::None => {
            let offset = tz.offset_from_utc_datetime(&now.naive_utc()).fix();
            (naive - Duration::seconds(i64::from(offset.local_minus_utc()))).time()
        }
    }
}

fn utc_to_local_in<Tz: TimeZone>(tz: &Tz, time: NaiveTime, now: DateTime<Utc>) -> NaiveTime {
    let utc = Utc.from_utc_datetime(&now.date_naive().and_time(time));
    utc.with_timezone(tz).time()
}
