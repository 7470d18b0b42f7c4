//! Normalization of the relative "posted" labels job boards show ("3d", "just now")
//! into absolute timestamps.

use chrono::{DateTime, Duration, Utc};

/// Convert a relative-time label into an absolute instant, relative to `now`.
///
/// Accepts `<integer><unit>` with unit one of `h`, `d`, `w`, `mo`, `y`
/// (a month is 30 days, a year 365 days) and the literals `now` / `just now`.
/// Anything else yields `None`; unparsable labels are never an error.
pub fn normalize_posted_at(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = input.trim().to_lowercase();

    if text == "now" || text == "just now" {
        return Some(now);
    }

    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = text.split_at(split);
    if digits.is_empty() {
        return None;
    }
    let amount: i64 = digits.parse().ok()?;

    let unit_hours: i64 = match unit {
        "h" => 1,
        "d" => 24,
        "w" => 7 * 24,
        "mo" => 30 * 24,
        "y" => 365 * 24,
        _ => return None,
    };

    let hours = amount.checked_mul(unit_hours)?;
    let offset = Duration::try_hours(hours)?;
    now.checked_sub_signed(offset)
}
