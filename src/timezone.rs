//! Fixed-offset timezone helpers. The directory stores whole-hour offsets
//! only; anything unresolvable falls back to UTC rather than failing the
//! affected person or watcher.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static OFFSET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([+-]?\d{1,2})").unwrap());

/// Parse a timezone value into a whole-hour offset. Accepts "3", "+3",
/// "-11", "UTC", "UTC+2", "GMT-4". Defaults to 0 on anything else.
pub fn parse_offset(value: &str) -> i32 {
    let s = value.trim();
    if s.eq_ignore_ascii_case("utc") {
        return 0;
    }
    if let Ok(n) = s.parse::<i32>() {
        return clamp_offset(n);
    }
    OFFSET_RE
        .captures(s)
        .and_then(|c| c[1].parse::<i32>().ok())
        .map(clamp_offset)
        .unwrap_or(0)
}

fn clamp_offset(hours: i32) -> i32 {
    hours.clamp(-12, 14)
}

/// Fixed-offset zone for a whole-hour offset; UTC when out of range.
pub fn tz_from_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// UTC instant of midnight on `date` in the given offset.
pub fn local_midnight(date: NaiveDate, tz_hours: i32) -> DateTime<Utc> {
    at_local(date, 0, 0, tz_hours)
}

/// UTC instant of `date` at hh:mm in the given offset. Out-of-range wall
/// clock values clamp to midnight.
pub fn at_local(date: NaiveDate, hour: u32, minute: u32, tz_hours: i32) -> DateTime<Utc> {
    let tz = tz_from_offset(tz_hours);
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let naive = date.and_time(time);
    match naive.and_local_timezone(tz) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // Fixed offsets never produce gaps or folds; this arm is for the
        // type system, not the calendar.
        _ => Utc.from_utc_datetime(&naive),
    }
}

/// Calendar date at `now` as seen from the given offset.
pub fn today_in(now: DateTime<Utc>, tz_hours: i32) -> NaiveDate {
    now.with_timezone(&tz_from_offset(tz_hours)).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_offset_plain_integers() {
        assert_eq!(parse_offset("3"), 3);
        assert_eq!(parse_offset("+3"), 3);
        assert_eq!(parse_offset("-11"), -11);
        assert_eq!(parse_offset(" 6 "), 6);
    }

    #[test]
    fn parse_offset_prefixed_strings() {
        assert_eq!(parse_offset("UTC"), 0);
        assert_eq!(parse_offset("utc"), 0);
        assert_eq!(parse_offset("UTC+2"), 2);
        assert_eq!(parse_offset("GMT-4"), -4);
    }

    #[test]
    fn parse_offset_garbage_falls_back_to_utc() {
        assert_eq!(parse_offset(""), 0);
        assert_eq!(parse_offset("tomorrow"), 0);
    }

    #[test]
    fn parse_offset_clamps_to_valid_range() {
        assert_eq!(parse_offset("99"), 14);
        assert_eq!(parse_offset("-99"), -12);
    }

    #[test]
    fn tz_from_offset_out_of_range_is_utc() {
        assert_eq!(tz_from_offset(99).local_minus_utc(), 0);
    }

    #[test]
    fn local_midnight_converts_to_utc() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        // Midnight in UTC+3 is 21:00 the previous day in UTC.
        let utc = local_midnight(d, 3);
        assert_eq!(utc.to_rfc3339(), "2024-02-29T21:00:00+00:00");
        // Midnight in UTC-5 is 05:00 the same day in UTC.
        let utc = local_midnight(d, -5);
        assert_eq!(utc.to_rfc3339(), "2024-03-01T05:00:00+00:00");
    }

    #[test]
    fn at_local_round_trips_wall_clock() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let utc = at_local(d, 9, 30, 5);
        let back = utc.with_timezone(&tz_from_offset(5));
        assert_eq!(back.date_naive(), d);
        assert_eq!(back.format("%H:%M").to_string(), "09:30");
    }

    #[test]
    fn today_in_respects_offset() {
        let now = DateTime::parse_from_rfc3339("2024-03-01T23:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            today_in(now, 1),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
        );
        assert_eq!(
            today_in(now, 0),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }
}
