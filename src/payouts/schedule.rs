use super::models::PayoutSchedule;
use crate::error::ScheduleError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

/// Next payout timestamp for a store, strictly after `from`.
///
/// Weekly: the next occurrence of the configured weekday (0 = Sunday).
/// Biweekly: a stable 14-day cadence stepped forward from `anchor` (the
/// previous scheduled time), so a late pass never drifts the cycle; with
/// no anchor it behaves like weekly.
/// Monthly: the configured day-of-month in the month after `from`, clamped
/// to the last valid day (31 becomes Feb 28/29).
pub fn calculate_next_payout_date(
    schedule: PayoutSchedule,
    day_of_week: Option<i16>,
    day_of_month: Option<i16>,
    from: DateTime<Utc>,
    anchor: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, ScheduleError> {
    match schedule {
        PayoutSchedule::Weekly => next_weekday(day_of_week, from),
        PayoutSchedule::Biweekly => match anchor {
            Some(anchor) => {
                let mut next = anchor;
                while next <= from {
                    next += Duration::days(14);
                }
                Ok(next)
            }
            None => next_weekday(day_of_week, from),
        },
        PayoutSchedule::Monthly => next_month_day(day_of_month, from),
    }
}

fn next_weekday(day_of_week: Option<i16>, from: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let target = day_of_week.ok_or(ScheduleError::MissingSchedule)?;
    if !(0..=6).contains(&target) {
        return Err(ScheduleError::InvalidDayOfWeek(target));
    }

    let current = from.weekday().num_days_from_sunday() as i16;
    let mut delta = (target - current).rem_euclid(7);
    if delta == 0 {
        delta = 7; // strictly after `from`, never same-day
    }

    Ok(midnight_utc(from.date_naive() + Duration::days(delta as i64)))
}

fn next_month_day(day_of_month: Option<i16>, from: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let target = day_of_month.ok_or(ScheduleError::MissingSchedule)?;
    if !(1..=31).contains(&target) {
        return Err(ScheduleError::InvalidDayOfMonth(target));
    }

    let (year, month) = if from.month() == 12 {
        (from.year() + 1, 1)
    } else {
        (from.year(), from.month() + 1)
    };

    let day = (target as u32).min(days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(ScheduleError::InvalidDayOfMonth(target))?;

    Ok(midnight_utc(date))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}
