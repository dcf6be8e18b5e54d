//! Pure calendar math for birthday occurrences.

use chrono::{Datelike, NaiveDate};

/// Build a calendar date, clamping Feb 29 to Feb 28 on non-leap years.
/// The stored birthday is never mutated; only the resolved date moves.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| {
        if month == 2 && day == 29 {
            NaiveDate::from_ymd_opt(year, 2, 28)
        } else {
            None
        }
    })
}

/// First date >= `reference` whose (month, day) matches. If this year's
/// candidate already passed, the occurrence is next year's. Returns None
/// for impossible input like (31, 4).
pub fn next_occurrence(day: u32, month: u32, reference: NaiveDate) -> Option<NaiveDate> {
    let candidate = clamped_date(reference.year(), month, day)?;
    if candidate < reference {
        clamped_date(reference.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}

/// Age the person turns on `occurrence`, when the birth year is known.
/// Used only for message rendering, never for scheduling.
pub fn age_at(occurrence: NaiveDate, birth_year: Option<i32>) -> Option<i32> {
    birth_year.map(|y| occurrence.year() - y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn occurrence_later_this_year() {
        assert_eq!(next_occurrence(1, 3, d(2024, 2, 27)), Some(d(2024, 3, 1)));
    }

    #[test]
    fn occurrence_today_counts() {
        assert_eq!(next_occurrence(1, 3, d(2024, 3, 1)), Some(d(2024, 3, 1)));
    }

    #[test]
    fn occurrence_rolls_to_next_year() {
        assert_eq!(next_occurrence(1, 3, d(2024, 3, 2)), Some(d(2025, 3, 1)));
    }

    #[test]
    fn feb_29_clamps_on_non_leap_years() {
        assert_eq!(next_occurrence(29, 2, d(2025, 1, 15)), Some(d(2025, 2, 28)));
    }

    #[test]
    fn feb_29_kept_on_leap_years() {
        assert_eq!(next_occurrence(29, 2, d(2024, 1, 15)), Some(d(2024, 2, 29)));
    }

    #[test]
    fn feb_29_clamp_applies_after_rollover() {
        // Passed this year, and next year is non-leap.
        assert_eq!(next_occurrence(29, 2, d(2024, 3, 1)), Some(d(2025, 2, 28)));
    }

    #[test]
    fn impossible_birthday_is_none() {
        assert_eq!(next_occurrence(31, 4, d(2024, 1, 1)), None);
        assert_eq!(next_occurrence(0, 1, d(2024, 1, 1)), None);
        assert_eq!(next_occurrence(1, 13, d(2024, 1, 1)), None);
    }

    #[test]
    fn age_needs_a_birth_year() {
        assert_eq!(age_at(d(2024, 3, 1), Some(1990)), Some(34));
        assert_eq!(age_at(d(2024, 3, 1), None), None);
    }
}
