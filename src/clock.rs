//! Calendar conversions for DNSSEC timestamps.
//!
//! RRSIG presentation format and the `val-override-date` option both use
//! `YYYYMMDDHHMMSS` in UTC.

use std::time::SystemTime;

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Format seconds since the epoch as `YYYYMMDDHHMMSS`.
pub fn format_timestamp(total_secs: u64) -> String {
    let (year, month, day) = days_to_ymd(total_secs / 86400);

    let day_secs = total_secs % 86400;
    let hours = day_secs / 3600;
    let mins = (day_secs % 3600) / 60;
    let secs = day_secs % 60;

    format!("{year:04}{month:02}{day:02}{hours:02}{mins:02}{secs:02}")
}

/// Parse `YYYYMMDDHHMMSS`, or a plain decimal count of seconds when the
/// input is shorter than fourteen digits.
pub fn parse_timestamp(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() != 14 {
        return s.parse().ok();
    }

    let field = |range: std::ops::Range<usize>| s[range].parse::<u64>().ok();
    let year = field(0..4)?;
    let month = field(4..6)?;
    let day = field(6..8)?;
    let hours = field(8..10)?;
    let mins = field(10..12)?;
    let secs = field(12..14)?;

    if year < 1970 || !(1..=12).contains(&month) || hours > 23 || mins > 59 || secs > 60 {
        return None;
    }
    if day < 1 || day > days_in_month(year as i64, month) {
        return None;
    }

    let days = ymd_to_days(year, month, day);
    Some(days * 86400 + hours * 3600 + mins * 60 + secs)
}

fn days_to_ymd(days: u64) -> (u64, u64, u64) {
    // Days since 1970-01-01
    let mut remaining = days as i64;
    let mut year = 1970i64;

    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining < days_in_year {
            break;
        }
        remaining -= days_in_year;
        year += 1;
    }

    let mut month = 1;
    while month <= 12 {
        let days_in_month = days_in_month(year, month) as i64;
        if remaining < days_in_month {
            break;
        }
        remaining -= days_in_month;
        month += 1;
    }

    (year as u64, month, remaining as u64 + 1)
}

fn ymd_to_days(year: u64, month: u64, day: u64) -> u64 {
    let mut days = 0;
    for y in 1970..year {
        days += if is_leap_year(y as i64) { 366 } else { 365 };
    }
    for m in 1..month {
        days += days_in_month(year as i64, m);
    }
    days + day - 1
}

fn days_in_month(year: i64, month: u64) -> u64 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
