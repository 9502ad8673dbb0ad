//! Cron utility functions for calculating next scheduled times
//!
//! The `cron` crate wants a leading seconds field; crontab style five-field
//! expressions are accepted and run at second zero.

use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Prefix a five-field crontab expression with a seconds field
pub fn normalize_cron_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Parse a five, six or seven field cron expression
pub fn parse_schedule(expression: &str) -> Result<Schedule, String> {
    let normalized = normalize_cron_expression(expression);
    Schedule::from_str(&normalized)
        .map_err(|e| format!("Invalid cron expression '{expression}': {e}"))
}

/// Next firing strictly after `after`, evaluated in `tz`
pub fn next_after<Tz: TimeZone>(
    schedule: &Schedule,
    after: DateTime<Utc>,
    tz: &Tz,
) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(tz))
        .next()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_five_field_expressions_are_normalized() {
        assert_eq!(normalize_cron_expression("30 3 * * *"), "0 30 3 * * *");
        assert_eq!(normalize_cron_expression(" 0 30 3 * * * "), "0 30 3 * * *");
    }

    #[test]
    fn test_invalid_cron_expression() {
        assert!(parse_schedule("invalid").is_err());
        assert!(parse_schedule("*/20 22,23,0,1,2 * * *").is_ok());
    }

    #[test]
    fn test_next_after_respects_timezone() {
        let schedule = parse_schedule("30 3 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 4, 29, 0, 0, 0).unwrap();

        // 03:30 in Shanghai is 19:30 UTC the previous day, so the next one
        // after midnight UTC is 19:30 UTC the same day
        let next = next_after(&schedule, after, &chrono_tz::Asia::Shanghai).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 4, 29, 19, 30, 0).unwrap());

        let next_utc = next_after(&schedule, after, &Utc).unwrap();
        assert_eq!((next_utc.hour(), next_utc.minute()), (3, 30));
    }
}
