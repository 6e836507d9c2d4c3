//! Five-field cron expressions
//!
//! Supports the standard `minute hour day-of-month month day-of-week` syntax:
//! `*`, single values, ranges (`1-5`), lists (`1,15`), steps (`*/15`, `0-30/10`)
//! and three-letter month/weekday names. Day-of-week accepts both 0 and 7 for
//! Sunday. When both day fields are restricted a time matches if either does.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};

use crate::error::{InvoicerError, InvoicerResult};

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// How far ahead `next_after` searches before giving up
const SEARCH_YEARS: i32 = 5;

/// Parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: u64,
    hours: u32,
    days_of_month: u32,
    months: u16,
    days_of_week: u8,
    dom_restricted: bool,
    dow_restricted: bool,
    raw: String,
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Value of the first entry in `names`
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], name_base: 0 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], name_base: 0 };
const DAY_OF_MONTH: FieldSpec =
    FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], name_base: 0 };
const MONTH: FieldSpec =
    FieldSpec { name: "month", min: 1, max: 12, names: &MONTH_NAMES, name_base: 1 };
const DAY_OF_WEEK: FieldSpec =
    FieldSpec { name: "day-of-week", min: 0, max: 7, names: &WEEKDAY_NAMES, name_base: 0 };

impl CronSchedule {
    /// Parse a five-field cron expression
    pub fn parse(expression: &str) -> InvoicerResult<Self> {
        let raw = expression.trim();
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(InvoicerError::Invalid(format!(
                "cron expression '{}' must have 5 fields, found {}",
                raw,
                fields.len()
            )));
        }

        let minutes = parse_field(fields[0], &MINUTE)?;
        let hours = parse_field(fields[1], &HOUR)?;
        let days_of_month = parse_field(fields[2], &DAY_OF_MONTH)?;
        let months = parse_field(fields[3], &MONTH)?;
        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK)?;

        // 7 is an alias for Sunday
        if days_of_week & (1_u64 << 7) != 0 {
            days_of_week |= 1_u64;
        }

        Ok(Self {
            minutes,
            hours: hours as u32,
            days_of_month: days_of_month as u32,
            months: months as u16,
            days_of_week: (days_of_week & 0x7f) as u8,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
            raw: raw.to_string(),
        })
    }

    /// The expression as written
    pub fn expression(&self) -> &str {
        &self.raw
    }

    /// Whether the schedule fires at the given wall-clock minute
    pub fn matches(&self, at: &NaiveDateTime) -> bool {
        self.minutes & (1_u64 << at.minute()) != 0
            && self.hours & (1_u32 << at.hour()) != 0
            && self.months & (1_u16 << at.month()) != 0
            && self.day_matches(&at.date())
    }

    /// First firing time strictly after `now`, in `now`'s time zone
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> InvoicerResult<DateTime<Tz>> {
        let tz = now.timezone();
        let local = now.naive_local();
        let limit = local + Duration::days(366 * i64::from(SEARCH_YEARS));

        let mut candidate = local
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(local)
            + Duration::minutes(1);

        while candidate <= limit {
            if self.months & (1_u16 << candidate.month()) == 0 {
                let Some(next_month) = first_of_next_month(candidate.date()) else {
                    break;
                };
                candidate = next_month;
                continue;
            }
            if !self.day_matches(&candidate.date()) {
                candidate = start_of_day(candidate.date() + Duration::days(1));
                continue;
            }
            if self.hours & (1_u32 << candidate.hour()) == 0 {
                candidate = candidate
                    .with_minute(0)
                    .unwrap_or(candidate)
                    + Duration::hours(1);
                continue;
            }
            if self.minutes & (1_u64 << candidate.minute()) == 0 {
                candidate += Duration::minutes(1);
                continue;
            }

            // Skip wall-clock times that do not exist (DST gaps)
            if let Some(resolved) = tz.from_local_datetime(&candidate).earliest() {
                if resolved > *now {
                    return Ok(resolved);
                }
            }
            candidate += Duration::minutes(1);
        }

        Err(InvoicerError::Invalid(format!(
            "cron expression '{}' never fires within {} years",
            self.raw, SEARCH_YEARS
        )))
    }

    fn day_matches(&self, date: &NaiveDate) -> bool {
        let dom = self.days_of_month & (1_u32 << date.day()) != 0;
        let dow = self.days_of_week & (1_u8 << date.weekday().num_days_from_sunday()) != 0;

        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = InvoicerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn parse_field(raw: &str, spec: &FieldSpec) -> InvoicerResult<u64> {
    let mut bits = 0_u64;
    for part in raw.split(',') {
        bits |= parse_part(part, spec)?;
    }
    Ok(bits)
}

fn parse_part(part: &str, spec: &FieldSpec) -> InvoicerResult<u64> {
    let invalid = |why: &str| {
        InvoicerError::Invalid(format!("cron {} field '{}': {}", spec.name, part, why))
    };

    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step.parse().map_err(|_| invalid("step is not a number"))?;
            if step == 0 {
                return Err(invalid("step must be positive"));
            }
            (range, step)
        }
        None => (part, 1),
    };

    let (start, end) = if range == "*" {
        (spec.min, spec.max)
    } else if let Some((lo, hi)) = range.split_once('-') {
        (parse_value(lo, spec)?, parse_value(hi, spec)?)
    } else {
        let value = parse_value(range, spec)?;
        // `5/15` means "from 5 to the end, every 15"
        if part.contains('/') {
            (value, spec.max)
        } else {
            (value, value)
        }
    };

    if start > end {
        return Err(invalid("range start is after range end"));
    }

    let mut bits = 0_u64;
    let mut value = start;
    while value <= end {
        bits |= 1_u64 << value;
        value += step;
    }
    Ok(bits)
}

fn parse_value(raw: &str, spec: &FieldSpec) -> InvoicerResult<u32> {
    let lower = raw.to_ascii_lowercase();
    let value = match spec.names.iter().position(|name| *name == lower) {
        Some(index) => index as u32 + spec.name_base,
        None => raw.parse().map_err(|_| {
            InvoicerError::Invalid(format!("cron {} value '{}' is not a number", spec.name, raw))
        })?,
    };

    if value < spec.min || value > spec.max {
        return Err(InvoicerError::Invalid(format!(
            "cron {} value {} out of range ({}-{})",
            spec.name, value, spec.min, spec.max
        )));
    }
    Ok(value)
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).map(start_of_day)
}
