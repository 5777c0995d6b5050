use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "wolfpad-dev",
            Profile::Prod => "wolfpad",
        }
    }
}

/// Get the configuration directory path for wolfpad
/// If profile is Dev, uses "wolfpad-dev" instead of "wolfpad"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "wolfpad", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path for wolfpad
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "wolfpad", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

/// Parse a wall-clock time of day in "HH:MM" form
pub fn parse_time_of_day(time_str: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(time_str, "%H:%M")
}

/// Monday of the week containing `day`
pub fn start_of_week(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

/// The seven dates of the Monday-start week containing `day`
pub fn week_days(day: NaiveDate) -> Vec<NaiveDate> {
    let monday = start_of_week(day);
    (0..7).map(|offset| monday + Duration::days(offset)).collect()
}

/// Convert an effort rating (1-5) into an estimated duration in seconds.
/// 1 -> 30 min, 2 -> 1 h, 3 -> 2 h, 4 -> 4 h, 5 -> 8 h, anything else -> 0
pub fn effort_to_seconds(effort: u8) -> f64 {
    const HOURS: [f64; 5] = [0.5, 1.0, 2.0, 4.0, 8.0];
    match effort {
        1..=5 => HOURS[usize::from(effort - 1)] * 3600.0,
        _ => 0.0,
    }
}

/// Fraction of the effort-derived estimate already tracked, capped at 1
pub fn progress_fraction(time_spent: f64, effort: u8) -> f64 {
    let estimate = effort_to_seconds(effort);
    if estimate <= 0.0 {
        return 0.0;
    }
    (time_spent / estimate).min(1.0)
}

/// Format seconds as HH:MM:SS
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
