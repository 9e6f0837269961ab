//! Schedule expression parsing and occurrence computation.
//!
//! Two forms are accepted: five-field cron ("0 9 * * 1-5") and the
//! interval shorthand "every <n><m|h|d>".

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

/// How far next_occurrence scans before giving up. Covers any satisfiable
/// five-field expression (e.g. Feb 29).
const SCAN_LIMIT_DAYS: i64 = 366 * 4;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleParseError {
    #[error("expected 5 cron fields, got {0}")]
    FieldCount(usize),
    #[error("invalid cron field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    #[error("invalid interval '{0}': expected e.g. 'every 10m', 'every 2h', 'every 1d'")]
    InvalidInterval(String),
}

/// A parsed recurring schedule.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleSpec {
    Cron(CronSpec),
    Interval(Duration),
}

impl ScheduleSpec {
    /// Parse either accepted form.
    pub fn parse(expr: &str) -> Result<Self, ScheduleParseError> {
        let expr = expr.trim();
        if let Some(rest) = expr.strip_prefix("every ") {
            return parse_interval(rest.trim(), expr);
        }
        Ok(ScheduleSpec::Cron(CronSpec::parse(expr)?))
    }

    /// First fire time strictly after `after`.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleSpec::Cron(spec) => spec.next_occurrence(after),
            ScheduleSpec::Interval(interval) => Some(after + *interval),
        }
    }
}

fn parse_interval(rest: &str, full: &str) -> Result<ScheduleSpec, ScheduleParseError> {
    let err = || ScheduleParseError::InvalidInterval(full.to_string());
    let unit = rest.chars().last().ok_or_else(err)?;
    let count: i64 = rest[..rest.len() - unit.len_utf8()].parse().map_err(|_| err())?;
    if count < 1 {
        return Err(err());
    }
    let duration = match unit {
        'm' => Duration::minutes(count),
        'h' => Duration::hours(count),
        'd' => Duration::days(count),
        _ => return Err(err()),
    };
    Ok(ScheduleSpec::Interval(duration))
}

/// Five-field cron expression: minute, hour, day-of-month, month,
/// day-of-week (Sunday is 0 or 7).
#[derive(Debug, Clone, PartialEq)]
pub struct CronSpec {
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: BTreeSet<u32>,
    months: BTreeSet<u32>,
    days_of_week: BTreeSet<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSpec {
    pub fn parse(expr: &str) -> Result<Self, ScheduleParseError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleParseError::FieldCount(fields.len()));
        }
        Ok(Self {
            minutes: parse_field(fields[0], 0, 59, false)?,
            hours: parse_field(fields[1], 0, 23, false)?,
            days_of_month: parse_field(fields[2], 1, 31, false)?,
            months: parse_field(fields[3], 1, 12, false)?,
            days_of_week: parse_field(fields[4], 0, 7, true)?,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    /// Whether the given minute matches. Seconds are ignored; the
    /// scheduler's granularity is one minute.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if !self.minutes.contains(&at.minute())
            || !self.hours.contains(&at.hour())
            || !self.months.contains(&at.month())
        {
            return false;
        }
        let dom = self.days_of_month.contains(&at.day());
        let dow = self
            .days_of_week
            .contains(&at.weekday().num_days_from_sunday());
        // standard cron: when both day fields are restricted, either one
        // matching fires the job
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            _ => dom && dow,
        }
    }

    /// Scan forward minute by minute for the next matching time.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = after
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(after)
            + Duration::minutes(1);
        let limit = after + Duration::days(SCAN_LIMIT_DAYS);
        while candidate <= limit {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

/// Parse one cron field: "*", "*/step", lists, ranges, ranges with step.
fn parse_field(
    field: &str,
    min: u32,
    max: u32,
    sunday_wraps: bool,
) -> Result<BTreeSet<u32>, ScheduleParseError> {
    let invalid = |reason: &str| ScheduleParseError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    };
    let mut values = BTreeSet::new();
    for entry in field.split(',') {
        let (range, step) = match entry.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid("bad step"))?;
                if step == 0 {
                    return Err(invalid("step must be positive"));
                }
                (range, step)
            }
            None => (entry, 1),
        };
        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (
                lo.parse().map_err(|_| invalid("bad range start"))?,
                hi.parse().map_err(|_| invalid("bad range end"))?,
            )
        } else {
            let value: u32 = range.parse().map_err(|_| invalid("not a number"))?;
            (value, value)
        };
        if lo < min || hi > max || lo > hi {
            return Err(invalid("out of range"));
        }
        let mut value = lo;
        while value <= hi {
            // cron allows Sunday as both 0 and 7
            values.insert(if sunday_wraps && value == 7 { 0 } else { value });
            value += step;
        }
    }
    if values.is_empty() {
        return Err(invalid("empty field"));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().expect("ts")
    }

    #[test]
    fn daily_nine_am_matches_only_that_minute() {
        let spec = CronSpec::parse("0 9 * * *").expect("parse");
        assert!(spec.matches(at(2026, 8, 24, 9, 0)));
        assert!(!spec.matches(at(2026, 8, 24, 9, 1)));
        assert!(!spec.matches(at(2026, 8, 24, 10, 0)));
    }

    #[test]
    fn weekday_range_with_sunday_as_zero() {
        // 2026-08-23 is a Sunday
        let spec = CronSpec::parse("0 9 * * 1-5").expect("parse");
        assert!(!spec.matches(at(2026, 8, 23, 9, 0)));
        assert!(spec.matches(at(2026, 8, 24, 9, 0))); // Monday

        let sunday_seven = CronSpec::parse("0 9 * * 7").expect("parse");
        assert!(sunday_seven.matches(at(2026, 8, 23, 9, 0)));
    }

    #[test]
    fn step_and_list_fields() {
        let spec = CronSpec::parse("*/15 0,12 * * *").expect("parse");
        assert!(spec.matches(at(2026, 8, 24, 0, 45)));
        assert!(spec.matches(at(2026, 8, 24, 12, 0)));
        assert!(!spec.matches(at(2026, 8, 24, 12, 10)));
        assert!(!spec.matches(at(2026, 8, 24, 6, 0)));
    }

    #[test]
    fn next_occurrence_is_strictly_after() {
        let spec = CronSpec::parse("30 8 * * *").expect("parse");
        let now = at(2026, 8, 24, 8, 30);
        assert_eq!(spec.next_occurrence(now), Some(at(2026, 8, 25, 8, 30)));
        assert_eq!(
            spec.next_occurrence(at(2026, 8, 24, 8, 29)),
            Some(at(2026, 8, 24, 8, 30))
        );
    }

    #[test]
    fn interval_shorthand_parses() {
        assert_eq!(
            ScheduleSpec::parse("every 10m").expect("parse"),
            ScheduleSpec::Interval(Duration::minutes(10))
        );
        assert_eq!(
            ScheduleSpec::parse("every 2h").expect("parse"),
            ScheduleSpec::Interval(Duration::hours(2))
        );
        let next = ScheduleSpec::parse("every 1d")
            .expect("parse")
            .next_occurrence(at(2026, 8, 24, 8, 0))
            .expect("next");
        assert_eq!(next, at(2026, 8, 25, 8, 0));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(matches!(
            ScheduleSpec::parse("0 9 * *"),
            Err(ScheduleParseError::FieldCount(4))
        ));
        assert!(ScheduleSpec::parse("61 * * * *").is_err());
        assert!(ScheduleSpec::parse("*/0 * * * *").is_err());
        assert!(ScheduleSpec::parse("every 5x").is_err());
        assert!(ScheduleSpec::parse("every 0m").is_err());
    }
}
