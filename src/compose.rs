//! Rendered alert text. Kept deliberately small: the scheduler decides
//! when, this module only decides the words.

use chrono::{Datelike, NaiveDate};

use crate::occurrence;

/// "today" or "in N days" alert line for one (person, watcher) pair.
/// `days_left` is computed in the watcher's timezone at send time.
pub fn alert_text(
    name: &str,
    birth_year: Option<i32>,
    occurrence: NaiveDate,
    days_left: i64,
) -> String {
    let age_part = occurrence::age_at(occurrence, birth_year)
        .map(|n| format!(" (turns {})", n))
        .unwrap_or_default();

    let body = if days_left <= 0 {
        format!("{}'s birthday is today{}!", name, age_part)
    } else {
        let noun = if days_left == 1 { "day" } else { "days" };
        format!(
            "{}'s birthday{} is in {} {}, on {:02}-{:02}.",
            name,
            age_part,
            days_left,
            noun,
            occurrence.day(),
            occurrence.month()
        )
    };

    format!("\u{1F382} {} \u{1F389}", body)
}
