//! Minimal 5-field cron expressions.
//!
//! Supports `*` or a single numeric value per field (`minute hour
//! day-of-month month day-of-week`), which covers the daily/weekly/monthly
//! schedules the engine actually registers. Next-fire computation scans
//! minute candidates, so it needs no timezone arithmetic edge cases.

use core::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::error::{BackupError, BackupResult};

/// Parsed cron expression. `None` in a field means `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minute: Option<u32>,
    hour: Option<u32>,
    day_of_month: Option<u32>,
    month: Option<u32>,
    day_of_week: Option<u32>,
    raw: String,
}

impl CronExpr {
    /// Parse a `minute hour dom month dow` expression.
    pub fn parse(raw: &str) -> BackupResult<Self> {
        let trimmed = raw.trim();
        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(BackupError::config(format!(
                "'{trimmed}' is not a 5-field cron expression"
            )));
        }
        Ok(Self {
            minute: parse_field(parts[0], 0, 59)?,
            hour: parse_field(parts[1], 0, 23)?,
            day_of_month: parse_field(parts[2], 1, 31)?,
            month: parse_field(parts[3], 1, 12)?,
            day_of_week: parse_field(parts[4], 0, 7)?,
            raw: trimmed.to_string(),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Next fire time strictly after `now`, or `None` if no minute within the
    /// next 366 days matches (possible with e.g. `0 0 31 2 *`).
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))?
            + Duration::minutes(1);
        // One year of minutes bounds the scan.
        for _ in 0..(366 * 24 * 60) {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }

    fn matches(&self, t: DateTime<Utc>) -> bool {
        if let Some(minute) = self.minute
            && t.minute() != minute
        {
            return false;
        }
        if let Some(hour) = self.hour
            && t.hour() != hour
        {
            return false;
        }
        if let Some(month) = self.month
            && t.month() != month
        {
            return false;
        }

        let dom_matches = self.day_of_month.is_none_or(|dom| t.day() == dom);
        let dow_matches = self.day_of_week.is_none_or(|dow| {
            // 0 and 7 are both Sunday.
            let candidate = t.weekday().num_days_from_sunday();
            candidate == dow % 7
        });

        // Standard cron: when both day fields are restricted, either matching
        // is enough; otherwise both (trivially) must match.
        match (self.day_of_month.is_some(), self.day_of_week.is_some()) {
            (true, true) => dom_matches || dow_matches,
            _ => dom_matches && dow_matches,
        }
    }
}

impl FromStr for CronExpr {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_field(raw: &str, min: u32, max: u32) -> BackupResult<Option<u32>> {
    if raw == "*" {
        return Ok(None);
    }
    let value: u32 = raw
        .parse()
        .map_err(|_| BackupError::config(format!("invalid cron field '{raw}'")))?;
    if value < min || value > max {
        return Err(BackupError::config(format!(
            "cron field '{raw}' out of range ({min}-{max})"
        )));
    }
    Ok(Some(value))
}
