//! Cron expression parsing in a job's timezone

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ::cron::Schedule;
use std::str::FromStr;

use crate::error::{GuardianError, Result};

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A parsed schedule bound to a timezone
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
    timezone: Tz,
}

impl CronSchedule {
    /// Parse a CronJob schedule.
    ///
    /// Accepts 5-field cron (Sunday as `0` or `7`), 6/7-field expressions,
    /// `@daily`-style macros and a leading `CRON_TZ=`/`TZ=` prefix, which
    /// takes precedence over `timezone`.
    pub fn parse(expression: &str, timezone: Option<&str>) -> Result<Self> {
        let (prefix_tz, body) = split_tz_prefix(expression);
        let timezone = parse_timezone(prefix_tz.or(timezone))?;
        let normalized = normalize_cron(body)
            .ok_or_else(|| GuardianError::invalid_schedule(expression, "unsupported field count"))?;
        let schedule = Schedule::from_str(&normalized)
            .map_err(|e| GuardianError::invalid_schedule(expression, e.to_string()))?;

        Ok(Self {
            expression: expression.trim().to_string(),
            schedule,
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Firings strictly after `after`, in UTC
    pub fn upcoming(&self, after: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .map(|t| t.with_timezone(&Utc))
    }

    /// Most recent firing in `(since, until]`
    pub fn latest_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.upcoming(since).take_while(|t| *t <= until).last()
    }
}

/// Resolve an IANA timezone name; empty or missing means UTC
pub fn parse_timezone(name: Option<&str>) -> Result<Tz> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| GuardianError::InvalidTimezone(name.to_string())),
    }
}

fn split_tz_prefix(expression: &str) -> (Option<&str>, &str) {
    let trimmed = expression.trim();
    for prefix in ["CRON_TZ=", "TZ="] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return match rest.split_once(char::is_whitespace) {
                Some((tz, body)) => (Some(tz), body.trim()),
                None => (Some(rest), ""),
            };
        }
    }
    (None, trimmed)
}

/// Convert CronJob syntax into the 6/7-field form the `cron` crate reads.
///
/// Returns `None` when the field count is not 5, 6 or 7.
pub(crate) fn normalize_cron(expression: &str) -> Option<String> {
    let trimmed = expression.trim();
    if trimmed.starts_with('@') {
        return expand_macro(trimmed).map(str::to_string);
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields.len() {
        5 => {
            let mut out = vec!["0".to_string()];
            out.extend(fields[..4].iter().map(|f| f.to_uppercase()));
            out.push(normalize_day_of_week(fields[4]));
            Some(out.join(" "))
        }
        6 | 7 => Some(trimmed.to_uppercase()),
        _ => None,
    }
}

fn expand_macro(expression: &str) -> Option<&'static str> {
    match expression.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Some("0 0 0 1 1 *"),
        "@monthly" => Some("0 0 0 1 * *"),
        "@weekly" => Some("0 0 0 * * SUN"),
        "@daily" | "@midnight" => Some("0 0 0 * * *"),
        "@hourly" => Some("0 0 * * * *"),
        _ => None,
    }
}

/// Rewrite numeric day-of-week values (0-7, Sunday = 0 or 7) as day names.
///
/// The `cron` crate numbers days 1-7 from Sunday, so numbers are expanded
/// to explicit name lists rather than shifted.
fn normalize_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|token| normalize_dow_token(token).unwrap_or_else(|| token.to_uppercase()))
        .collect::<Vec<_>>()
        .join(",")
}

fn normalize_dow_token(token: &str) -> Option<String> {
    let (range, step) = match token.split_once('/') {
        Some((range, step)) => (range, Some(step.parse::<usize>().ok()?)),
        None => (token, None),
    };

    let (start, end) = match range {
        "*" | "?" => match step {
            Some(_) => (0, 6),
            None => return Some(range.to_string()),
        },
        _ => match range.split_once('-') {
            Some((a, b)) => (a.parse::<usize>().ok()?, b.parse::<usize>().ok()?),
            None => {
                let day = range.parse::<usize>().ok()?;
                (day, if step.is_some() { 6 } else { day })
            }
        },
    };
    if start > 7 || end > 7 || start > end {
        return None;
    }

    let mut names: Vec<&str> = (start..=end)
        .step_by(step.unwrap_or(1).max(1))
        .map(|day| DAY_NAMES[day % 7])
        .collect();
    names.dedup();
    Some(names.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    #[test]
    fn test_normalize_five_fields() {
        assert_eq!(normalize_cron("*/5 * * * *").unwrap(), "0 */5 * * * *");
        assert_eq!(normalize_cron("0 3 * * 1-5").unwrap(), "0 0 3 * * MON,TUE,WED,THU,FRI");
        assert_eq!(normalize_cron("0 3 * * 0").unwrap(), "0 0 3 * * SUN");
        assert_eq!(normalize_cron("0 3 * * 5-7").unwrap(), "0 0 3 * * FRI,SAT,SUN");
        assert_eq!(normalize_cron("0 3 * * mon").unwrap(), "0 0 3 * * MON");
        assert_eq!(normalize_cron("0 0 * * */2").unwrap(), "0 0 0 * * SUN,TUE,THU,SAT");
        assert!(normalize_cron("* * *").is_none());
    }

    #[test]
    fn test_macros() {
        assert_eq!(normalize_cron("@daily").unwrap(), "0 0 0 * * *");
        assert!(normalize_cron("@sometimes").is_none());
    }

    #[test]
    fn test_weekday_schedule_fires_on_weekdays() {
        let schedule = CronSchedule::parse("0 9 * * 1-5", None).unwrap();
        // Saturday
        let start = Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap();
        let next = schedule.upcoming(start).next().unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(next.hour(), 9);
    }

    #[test]
    fn test_timezone_prefix_and_argument() {
        let berlin = CronSchedule::parse("CRON_TZ=Europe/Berlin 0 3 * * *", Some("UTC")).unwrap();
        assert_eq!(berlin.timezone(), Tz::Europe__Berlin);

        let start = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        // 03:00 CET is 02:00 UTC in winter
        assert_eq!(berlin.upcoming(start).next().unwrap().hour(), 2);

        let tokyo = CronSchedule::parse("0 3 * * *", Some("Asia/Tokyo")).unwrap();
        assert_eq!(tokyo.upcoming(start).next().unwrap().hour(), 18);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            CronSchedule::parse("61 * * * *", None),
            Err(GuardianError::InvalidSchedule { .. })
        ));
        assert!(matches!(
            CronSchedule::parse("0 3 * * *", Some("Mars/Olympus")),
            Err(GuardianError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_latest_between() {
        let schedule = CronSchedule::parse("0 * * * *", None).unwrap();
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2024, 1, 1, 12, 59, 0).unwrap();
        assert_eq!(
            schedule.latest_between(since, until),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(schedule.latest_between(since, since), None);
    }
}
