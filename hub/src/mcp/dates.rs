use chrono::{Local, NaiveDate};
use std::cmp::Ordering;

/// Today's local date as `YYYY-MM-DD`.
pub fn current_date() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Classify `requested` relative to `current`: `past`, `today` or `future`.
///
/// Identical strings are `today`. When both parse as `YYYY-MM-DD` they are
/// compared as calendar dates, otherwise lexically.
pub fn compare_dates(requested: &str, current: &str) -> &'static str {
    let (requested, current) = (requested.trim(), current.trim());
    if requested == current {
        return "today";
    }
    let ordering = match (parse_date(requested), parse_date(current)) {
        (Some(r), Some(c)) => r.cmp(&c),
        _ => requested.cmp(current),
    };
    match ordering {
        Ordering::Less => "past",
        Ordering::Equal => "today",
        Ordering::Greater => "future",
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
