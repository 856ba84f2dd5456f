//! Local wall-clock day boundaries used for bucketing and overlap tests.
//!
//! A "calendar day" is relative to the viewing device's zone. Every helper
//! takes the zone explicitly; callers that want the device zone pass
//! `&chrono::Local`.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, TimeZone, Utc};

pub fn local_day<Tz: TimeZone>(ts: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}

/// First instant of `date` in `tz`. A midnight that falls in a DST gap
/// resolves to the first valid instant after it.
pub fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    resolve_earliest(date.and_time(chrono::NaiveTime::MIN), tz)
}

/// True when `[start, end]` touches the half-open local day
/// `[start_of_day(date), start_of_day(date + 1))`. Sub-millisecond
/// timestamps late in the day still count as that day.
pub fn overlaps_day<Tz: TimeZone>(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    date: NaiveDate,
    tz: &Tz,
) -> bool {
    let before_next_day = match date.succ_opt() {
        Some(next) => start < start_of_day(next, tz),
        None => true,
    };
    before_next_day && end >= start_of_day(date, tz)
}

/// Last millisecond of `date` in `tz`, for display.
pub fn end_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    match date.succ_opt() {
        Some(next) => start_of_day(next, tz) - chrono::Duration::milliseconds(1),
        None => DateTime::<Utc>::MAX_UTC,
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// The Sunday on or before the first day of `date`'s month.
pub fn grid_start(date: NaiveDate) -> NaiveDate {
    let first = first_of_month(date);
    let offset = first.weekday().num_days_from_sunday() as u64;
    first.checked_sub_days(Days::new(offset)).unwrap_or(first)
}

fn resolve_earliest<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Inside a DST gap: step forward until the wall clock exists again.
    let mut candidate = naive;
    for _ in 0..4 * 60 {
        candidate += chrono::Duration::minutes(1);
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt.with_timezone(&Utc);
        }
    }
    // No real zone skips four hours. Read the wall clock as UTC rather than panic.
    naive.and_utc()
}
