//! Timestamp and calendar utilities

use crate::models::MonthDay;
use chrono::{DateTime, NaiveDate, Utc};

/// Non-leap year used to measure month/day distances
pub const REFERENCE_YEAR: i32 = 2023;

/// Two-digit years at or below this pivot belong to the 2000s
pub const TWO_DIGIT_YEAR_PIVOT: u32 = 30;

/// February 29th
pub const LEAP_DAY: MonthDay = MonthDay { month: 2, day: 29 };

const LEAP_ADJACENCIES: [(MonthDay, MonthDay); 3] = [
    (MonthDay { month: 2, day: 28 }, MonthDay { month: 2, day: 29 }),
    (MonthDay { month: 2, day: 29 }, MonthDay { month: 3, day: 1 }),
    (MonthDay { month: 2, day: 28 }, MonthDay { month: 3, day: 1 }),
];

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Expand a two-digit year in `date` and switch `%y` to `%Y` in `format`
///
/// Years `00..=30` become `2000..=2030`, `31..=99` become `1931..=1999`.
/// A four-digit year under a `%y` format is accepted as-is with `%Y`.
/// Returns the inputs unchanged when the format has no `%y`.
pub fn expand_two_digit_year(date: &str, format: &str) -> (String, String) {
    if !format.contains("%y") {
        return (date.to_string(), format.to_string());
    }

    let trimmed = format.trim();
    let year_at_end = trimmed.ends_with("%y");
    let year_at_start = trimmed.starts_with("%y");

    let (prefix, digits, suffix) = if year_at_end {
        let split = date
            .char_indices()
            .rev()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        (&date[..split], &date[split..], "")
    } else if year_at_start {
        let split = date
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(date.len());
        ("", &date[..split], &date[split..])
    } else {
        return (date.to_string(), format.to_string());
    };

    let expanded = match digits.len() {
        2 => match digits.parse::<u32>() {
            Ok(yy) if yy <= TWO_DIGIT_YEAR_PIVOT => format!("20{}", digits),
            Ok(_) => format!("19{}", digits),
            Err(_) => return (date.to_string(), format.to_string()),
        },
        4 => digits.to_string(),
        _ => return (date.to_string(), format.to_string()),
    };

    (
        format!("{}{}{}", prefix, expanded, suffix),
        format.replacen("%y", "%Y", 1),
    )
}

/// Absolute day distance between two month/days on the reference year
///
/// `None` when either value does not exist in a non-leap year (Feb 29).
pub fn day_distance(a: MonthDay, b: MonthDay) -> Option<i64> {
    let da = NaiveDate::from_ymd_opt(REFERENCE_YEAR, a.month, a.day)?;
    let db = NaiveDate::from_ymd_opt(REFERENCE_YEAR, b.month, b.day)?;
    Some((db - da).num_days().abs())
}

/// True when the two values are at most one day apart on the reference year
pub fn are_adjacent(a: MonthDay, b: MonthDay) -> bool {
    matches!(day_distance(a, b), Some(d) if d <= 1)
}

/// True for the Feb 28 / Feb 29 / Mar 1 confusions seen around leap days
pub fn is_leap_adjacency(a: MonthDay, b: MonthDay) -> bool {
    LEAP_ADJACENCIES
        .iter()
        .any(|&(x, y)| (a == x && b == y) || (a == y && b == x))
}
