//! Calendar arithmetic and date parsing for `older` / `newer` comparisons.

use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month};

use super::ast::{DateDirection, DateUnit};

/// How a year-only (`2019`) or year-month (`2019-06`) tag value is pinned
/// to a single day before being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialDatePolicy {
    /// Latest day for `older`, earliest day for `newer`: a partial date only
    /// matches when every day it could stand for matches.
    Conservative,
    /// Always the first day of the year/month.
    EarliestDay,
    /// Always the last day of the year/month.
    LatestDay,
}

/// Policy used unless a query or the quest catalog says otherwise.
pub const DEFAULT_PARTIAL_DATE_POLICY: PartialDatePolicy = PartialDatePolicy::Conservative;

impl Default for PartialDatePolicy {
    fn default() -> Self {
        DEFAULT_PARTIAL_DATE_POLICY
    }
}

impl PartialDatePolicy {
    pub fn resolve(self, date: TagDate, direction: DateDirection) -> Date {
        match (self, direction) {
            (PartialDatePolicy::EarliestDay, _) => date.earliest,
            (PartialDatePolicy::LatestDay, _) => date.latest,
            (PartialDatePolicy::Conservative, DateDirection::Older) => date.latest,
            (PartialDatePolicy::Conservative, DateDirection::Newer) => date.earliest,
        }
    }
}

/// A date read from a tag value, possibly covering a whole month or year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagDate {
    pub earliest: Date,
    pub latest: Date,
}

impl TagDate {
    /// Parse `YYYY-MM-DD`, `YYYY-MM` or `YYYY`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let year = parse_digits(parts.next()?, 4)?;
        let year = i32::try_from(year).ok()?;

        let Some(month) = parts.next() else {
            return Some(TagDate {
                earliest: Date::from_calendar_date(year, Month::January, 1).ok()?,
                latest: Date::from_calendar_date(year, Month::December, 31).ok()?,
            });
        };
        let month = Month::try_from(u8::try_from(parse_digits(month, 2)?).ok()?).ok()?;

        let Some(day) = parts.next() else {
            return Some(TagDate {
                earliest: Date::from_calendar_date(year, month, 1).ok()?,
                latest: Date::from_calendar_date(year, month, last_day_of_month(year, month))
                    .ok()?,
            });
        };
        let day = u8::try_from(parse_digits(day, 2)?).ok()?;
        if parts.next().is_some() {
            return None;
        }

        let date = Date::from_calendar_date(year, month, day).ok()?;
        Some(TagDate {
            earliest: date,
            latest: date,
        })
    }
}

fn parse_digits(part: &str, len: usize) -> Option<u32> {
    if part.len() != len || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Parse a full `YYYY-MM-DD` date.
pub fn parse_iso_date(value: &str) -> Option<Date> {
    let date = TagDate::parse(value)?;
    (date.earliest == date.latest).then_some(date.earliest)
}

pub fn last_day_of_month(year: i32, month: Month) -> u8 {
    (28..=31)
        .rev()
        .find(|&day| Date::from_calendar_date(year, month, day).is_ok())
        .unwrap_or(28)
}

/// Move `date` back by `months` calendar months, clamping the day of month
/// (March 31 minus one month is February 28/29).
pub fn sub_months(date: Date, months: i64) -> Option<Date> {
    let index = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1;
    let index = index.checked_sub(months)?;
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(index.rem_euclid(12) + 1).ok()?).ok()?;
    let day = date.day().min(last_day_of_month(year, month));
    Date::from_calendar_date(year, month, day).ok()
}

// Beyond the span of `time::Date` anyway; keeps `Duration::days` from overflowing.
const MAX_DAY_OFFSET: f64 = 10_000_000.0;

fn sub_days(date: Date, days: f64) -> Option<Date> {
    let days = days.round();
    if !(0.0..=MAX_DAY_OFFSET).contains(&days) {
        return None;
    }
    date.checked_sub(Duration::days(days as i64))
}

/// `reference - magnitude * unit`.
///
/// Years and months are calendar steps; weeks and days are exact day counts.
/// A fractional part of a year or month is converted to days (365.25 and
/// 30.5 days respectively). Results before the earliest representable date
/// saturate to `Date::MIN`.
pub fn date_before(reference: Date, magnitude: f64, unit: DateUnit) -> Date {
    let whole = magnitude.trunc();
    let fraction = magnitude - whole;
    let result = match unit {
        DateUnit::Years => (whole as i64)
            .checked_mul(12)
            .and_then(|months| sub_months(reference, months))
            .and_then(|date| sub_days(date, fraction * 365.25)),
        DateUnit::Months => {
            sub_months(reference, whole as i64).and_then(|date| sub_days(date, fraction * 30.5))
        }
        DateUnit::Weeks => sub_days(reference, magnitude * 7.0),
        DateUnit::Days => sub_days(reference, magnitude),
    };
    result.unwrap_or(Date::MIN)
}
