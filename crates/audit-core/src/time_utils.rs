use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;

/// Truncate a calendar date to the first day of its month.
///
/// # Examples
///
/// ```
/// use audit_core::time_utils::month_start;
/// use chrono::NaiveDate;
///
/// let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
/// assert_eq!(month_start(d), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
/// ```
pub fn month_start(date: NaiveDate) -> NaiveDate {
    // Day 1 exists in every month, so with_day(1) cannot fail.
    date.with_day(1).unwrap_or(date)
}

/// Format a month key as `YYYY-MM` for display.
pub fn month_label(month: NaiveDate) -> String {
    month.format("%Y-%m").to_string()
}

/// Staging partition path segment for a date, e.g. `2024/06/01`.
pub fn staging_partition(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

fn partition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4})[/\\](\d{2})[/\\](\d{2})[/\\][^/\\]+$").expect("valid partition regex")
    })
}

/// Extract the staging date from a path of the form
/// `.../<YYYY>/<MM>/<DD>/<file>`.
///
/// Returns `None` when the path carries no valid date partition.
pub fn parse_staging_partition(path: &str) -> Option<NaiveDate> {
    let caps = partition_regex().captures(path)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Default snapshot identifier for a run started at `now`.
///
/// # Examples
///
/// ```
/// use audit_core::time_utils::generate_run_id;
/// use chrono::{TimeZone, Utc};
///
/// let now = Utc.with_ymd_and_hms(2024, 6, 1, 13, 5, 9).unwrap();
/// assert_eq!(generate_run_id(now), "run-20240601T130509Z");
/// ```
pub fn generate_run_id(now: DateTime<Utc>) -> String {
    now.format("run-%Y%m%dT%H%M%SZ").to_string()
}

fn run_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("valid run id regex"))
}

/// Whether `run_id` is safe to use as a single snapshot directory name.
pub fn is_valid_run_id(run_id: &str) -> bool {
    run_id_regex().is_match(run_id) && !run_id.contains("..")
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_start_mid_month() {
        assert_eq!(month_start(date(2024, 3, 17)), date(2024, 3, 1));
    }

    #[test]
    fn test_month_start_already_first() {
        assert_eq!(month_start(date(2024, 1, 1)), date(2024, 1, 1));
    }

    #[test]
    fn test_month_start_end_of_year() {
        assert_eq!(month_start(date(2023, 12, 31)), date(2023, 12, 1));
    }

    #[test]
    fn test_month_label() {
        assert_eq!(month_label(date(2024, 7, 1)), "2024-07");
    }

    #[test]
    fn test_staging_partition() {
        assert_eq!(staging_partition(date(2024, 6, 1)), "2024/06/01");
    }

    #[test]
    fn test_parse_staging_partition() {
        let parsed = parse_staging_partition("/staging/usage/2024/06/01/usage.csv");
        assert_eq!(parsed, Some(date(2024, 6, 1)));
    }

    #[test]
    fn test_parse_staging_partition_invalid_date() {
        assert_eq!(parse_staging_partition("/staging/usage/2024/13/01/usage.csv"), None);
    }

    #[test]
    fn test_parse_staging_partition_no_partition() {
        assert_eq!(parse_staging_partition("/staging/usage/usage.csv"), None);
    }

    #[test]
    fn test_generate_run_id() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(generate_run_id(now), "run-20250102T030405Z");
    }

    #[test]
    fn test_generated_run_id_is_valid() {
        assert!(is_valid_run_id(&generate_run_id(Utc::now())));
    }

    #[test]
    fn test_run_id_rejects_path_components() {
        assert!(!is_valid_run_id("../escape"));
        assert!(!is_valid_run_id("a/b"));
        assert!(!is_valid_run_id(""));
        assert!(!is_valid_run_id(".hidden"));
        assert!(is_valid_run_id("2024-06-monthly"));
    }
}
