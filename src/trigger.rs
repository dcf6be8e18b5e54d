//! Converts a person-local birthday occurrence into the UTC instant at
//! which one particular watcher should be alerted.

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};

use crate::timezone::{at_local, local_midnight, tz_from_offset};
use crate::types::AlertModel;

/// A computed alert instant plus the metadata the composer renders from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPlan {
    pub trigger_utc: DateTime<Utc>,
    /// Occurrence date in the person's local calendar.
    pub occurrence: NaiveDate,
    /// Whole days between the trigger and the occurrence, both seen from
    /// the watcher's timezone. 0 means the day itself.
    pub days_until: i64,
}

/// Person-local midnight of the occurrence, converted into the watcher's
/// timezone, with the watcher's alert model applied, converted back to UTC.
pub fn plan_trigger(
    occurrence: NaiveDate,
    person_tz: i32,
    watcher_tz: i32,
    model: AlertModel,
) -> TriggerPlan {
    let midnight_utc = local_midnight(occurrence, person_tz);
    let wtz = tz_from_offset(watcher_tz);
    let occurrence_in_watcher = midnight_utc.with_timezone(&wtz);

    let trigger_utc = match model {
        AlertModel::HoursBefore(h) => {
            (occurrence_in_watcher - Duration::hours(h)).with_timezone(&Utc)
        }
        AlertModel::DaysBeforeAt { days, hour, minute } => {
            let trigger_date = occurrence_in_watcher
                .date_naive()
                .checked_sub_days(Days::new(days.max(0) as u64))
                .unwrap_or_else(|| occurrence_in_watcher.date_naive());
            at_local(trigger_date, hour, minute, watcher_tz)
        }
    };

    let days_until = (occurrence_in_watcher.date_naive()
        - trigger_utc.with_timezone(&wtz).date_naive())
    .num_days();

    TriggerPlan {
        trigger_utc,
        occurrence,
        days_until,
    }
}
