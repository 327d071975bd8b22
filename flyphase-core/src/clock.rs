//! Report time groups (`ddhhmmZ`, `ddhh`, `hhmm`) resolved against a reference instant.
//!
//! Reports carry only day-of-month and time, so the month and year come from
//! whichever candidate lies closest to the reference.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

/// Defaults applied when a report omits its station or time.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub now: DateTime<Utc>,
    pub home_icao: String,
}

impl ParseContext {
    pub fn new(now: DateTime<Utc>, home_icao: &str) -> Self {
        ParseContext {
            now,
            home_icao: home_icao.to_ascii_uppercase(),
        }
    }
}

/// Resolve day/hour/minute to the instant nearest `reference`.
///
/// Hour 24 is accepted (TAF period ends) and rolls to 00 the next day.
pub fn resolve_day_time(
    reference: DateTime<Utc>,
    day: u32,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Utc>> {
    if day == 0 || day > 31 || hour > 24 || minute > 59 || (hour == 24 && minute != 0) {
        return None;
    }
    let (h, carry) = if hour == 24 { (0, 1) } else { (hour, 0) };

    [-1, 0, 1]
        .iter()
        .filter_map(|&offset| {
            let (y, m) = shift_month(reference.year(), reference.month(), offset);
            let date = NaiveDate::from_ymd_opt(y, m, day)?;
            let naive = date.and_hms_opt(h, minute, 0)? + Duration::days(carry);
            Some(Utc.from_utc_datetime(&naive))
        })
        .min_by_key(|t| (*t - reference).num_seconds().abs())
}

/// Resolve a time of day to the instant nearest `reference` (yesterday, today or tomorrow).
pub fn resolve_time_of_day(reference: DateTime<Utc>, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    if hour > 23 || minute > 59 {
        return None;
    }
    let today = reference.date_naive().and_hms_opt(hour, minute, 0)?;
    [-1i64, 0, 1]
        .iter()
        .map(|&d| Utc.from_utc_datetime(&(today + Duration::days(d))))
        .min_by_key(|t| (*t - reference).num_seconds().abs())
}

/// Parse a local `HHMM` sortie time and convert it to UTC near `reference`.
pub fn local_hhmm_to_utc(text: &str, utc_offset_hours: i32, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: i64 = text[..2].parse().ok()?;
    let minute: i64 = text[2..].parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    let utc_minutes = (hour * 60 + minute - i64::from(utc_offset_hours) * 60).rem_euclid(24 * 60);
    resolve_time_of_day(reference, (utc_minutes / 60) as u32, (utc_minutes % 60) as u32)
}

/// Split a digit-only group into two-digit fields.
pub(crate) fn two_digit_fields(s: &str) -> Option<Vec<u32>> {
    if s.is_empty() || s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s[i..i + 2].parse().ok())
        .collect()
}

fn shift_month(year: i32, month: u32, offset: i32) -> (i32, u32) {
    let index = year * 12 + (month as i32 - 1) + offset;
    (index.div_euclid(12), (index.rem_euclid(12) + 1) as u32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_same_month() {
        let now = at(2026, 3, 15, 8, 0);
        assert_eq!(resolve_day_time(now, 15, 6, 0), Some(at(2026, 3, 15, 6, 0)));
    }

    #[test]
    fn test_previous_month_wrap() {
        let now = at(2026, 4, 1, 0, 30);
        assert_eq!(resolve_day_time(now, 31, 23, 50), Some(at(2026, 3, 31, 23, 50)));
    }

    #[test]
    fn test_next_month_wrap() {
        let now = at(2026, 12, 31, 22, 0);
        assert_eq!(resolve_day_time(now, 1, 6, 0), Some(at(2027, 1, 1, 6, 0)));
    }

    #[test]
    fn test_hour_24_rolls_over() {
        let now = at(2026, 3, 15, 6, 0);
        assert_eq!(resolve_day_time(now, 15, 24, 0), Some(at(2026, 3, 16, 0, 0)));
    }

    #[test]
    fn test_invalid_fields() {
        let now = at(2026, 3, 15, 6, 0);
        assert!(resolve_day_time(now, 0, 6, 0).is_none());
        assert!(resolve_day_time(now, 15, 25, 0).is_none());
        assert!(resolve_day_time(now, 15, 24, 30).is_none());
    }

    #[test]
    fn test_time_of_day_previous_day() {
        let now = at(2026, 3, 15, 0, 20);
        assert_eq!(resolve_time_of_day(now, 23, 50), Some(at(2026, 3, 14, 23, 50)));
    }

    #[test]
    fn test_local_sortie_time() {
        let now = at(2026, 3, 15, 5, 0);
        // 0930 local at UTC+3 is 0630Z
        assert_eq!(local_hhmm_to_utc("0930", 3, now), Some(at(2026, 3, 15, 6, 30)));
        assert!(local_hhmm_to_utc("930", 3, now).is_none());
        assert!(local_hhmm_to_utc("2460", 3, now).is_none());
    }

    #[test]
    fn test_two_digit_fields() {
        assert_eq!(two_digit_fields("310600"), Some(vec![31, 6, 0]));
        assert!(two_digit_fields("3106A0").is_none());
        assert!(two_digit_fields("123").is_none());
    }
}
