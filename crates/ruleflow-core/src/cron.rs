//! Five-field cron expressions for schedule triggers.
//!
//! ```text
//! ┌ minute (0-59)
//! │ ┌ hour (0-23)
//! │ │ ┌ day of month (1-31)
//! │ │ │ ┌ month (1-12 or jan-dec)
//! │ │ │ │ ┌ day of week (0-7 or sun-sat; 0 and 7 are Sunday)
//! * * * * *
//! ```
//!
//! Each field accepts `*`, single values, `a-b` ranges, `,` lists and a
//! `/step` suffix. Matching is at minute resolution in UTC.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::{Result, RuleflowError};

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Offset added to a name's index (months are 1-based, weekdays 0-based).
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], name_base: 0 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], name_base: 0 };
const DAY: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], name_base: 0 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, names: &MONTH_NAMES, name_base: 1 };
const WEEKDAY: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7, names: &DAY_NAMES, name_base: 0 };

/// A parsed cron schedule. Each field is a bitmask of permitted values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    weekdays: u64,
    day_restricted: bool,
    weekday_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        let expanded = match trimmed {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            "@yearly" | "@annually" => "0 0 1 1 *",
            other => other,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                expr,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let mut weekdays = parse_field(expr, fields[4], WEEKDAY)?;
        // 7 is an alias for Sunday.
        if weekdays & (1 << 7) != 0 {
            weekdays = (weekdays & !(1 << 7)) | 1;
        }

        Ok(Self {
            minutes: parse_field(expr, fields[0], MINUTE)?,
            hours: parse_field(expr, fields[1], HOUR)?,
            days: parse_field(expr, fields[2], DAY)?,
            months: parse_field(expr, fields[3], MONTH)?,
            weekdays,
            day_restricted: !fields[2].starts_with('*'),
            weekday_restricted: !fields[4].starts_with('*'),
        })
    }

    /// Whether the minute containing `at` is selected by this schedule.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        let bit = |mask: u64, v: u32| mask & (1u64 << v) != 0;

        if !bit(self.minutes, at.minute())
            || !bit(self.hours, at.hour())
            || !bit(self.months, at.month())
        {
            return false;
        }

        let day_ok = bit(self.days, at.day());
        let weekday_ok = bit(self.weekdays, at.weekday().num_days_from_sunday());
        // Classic cron: when both day fields are restricted, either may match.
        if self.day_restricted && self.weekday_restricted {
            day_ok || weekday_ok
        } else {
            day_ok && weekday_ok
        }
    }
}

impl std::str::FromStr for CronSchedule {
    type Err = RuleflowError;

    fn from_str(s: &str) -> Result<Self> {
        CronSchedule::parse(s)
    }
}

fn invalid(expr: &str, reason: String) -> RuleflowError {
    RuleflowError::InvalidCron {
        expr: expr.to_string(),
        reason,
    }
}

fn parse_field(expr: &str, field: &str, spec: FieldSpec) -> Result<u64> {
    let mut mask = 0u64;
    for part in field.split(',') {
        let (base, step) = match part.split_once('/') {
            Some((b, s)) => {
                let step: u32 = s
                    .parse()
                    .map_err(|_| invalid(expr, format!("bad step '{s}' in {}", spec.name)))?;
                if step == 0 {
                    return Err(invalid(expr, format!("zero step in {}", spec.name)));
                }
                (b, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if base == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = base.split_once('-') {
            (parse_value(expr, a, spec)?, parse_value(expr, b, spec)?)
        } else {
            let v = parse_value(expr, base, spec)?;
            // `5/15` means "from 5 every 15".
            if part.contains('/') {
                (v, spec.max)
            } else {
                (v, v)
            }
        };

        if lo > hi {
            return Err(invalid(
                expr,
                format!("range {lo}-{hi} is reversed in {}", spec.name),
            ));
        }
        for v in (lo..=hi).step_by(step as usize) {
            mask |= 1u64 << v;
        }
    }
    Ok(mask)
}

fn parse_value(expr: &str, raw: &str, spec: FieldSpec) -> Result<u32> {
    let lower = raw.to_ascii_lowercase();
    if let Some(i) = spec.names.iter().position(|n| *n == lower) {
        return Ok(i as u32 + spec.name_base);
    }
    let v: u32 = raw
        .parse()
        .map_err(|_| invalid(expr, format!("bad value '{raw}' in {}", spec.name)))?;
    if v < spec.min || v > spec.max {
        return Err(invalid(
            expr,
            format!(
                "{v} is outside {}..={} in {}",
                spec.min, spec.max, spec.name
            ),
        ));
    }
    Ok(v)
}
