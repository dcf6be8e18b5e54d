use chrono::{DateTime, NaiveDate, Utc};

/// A directory entry. The same record serves both roles: a tracked person
/// whose birthday gets scheduled, and a watcher receiving alerts about
/// other people.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: Option<String>,
    /// Messaging target. Absent until the user has opened a chat, which
    /// makes them unreachable as a watcher.
    pub chat_id: Option<i64>,
    pub birth_day: Option<u32>,
    pub birth_month: Option<u32>,
    pub birth_year: Option<i32>,
    /// Fixed timezone offset in whole hours. No DST handling.
    pub tz_offset: i32,
    pub alert: AlertModel,
}

impl UserRecord {
    /// (day, month) when both halves are present; scheduling requires both.
    pub fn birthday(&self) -> Option<(u32, u32)> {
        match (self.birth_day, self.birth_month) {
            (Some(d), Some(m)) => Some((d, m)),
            _ => None,
        }
    }

    /// Lower-cased handle used to match friend edges recorded by username.
    pub fn handle_lower(&self) -> Option<String> {
        self.username.as_ref().map(|u| u.to_lowercase())
    }

    /// Display name for rendered alerts.
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| format!("id:{}", self.user_id))
    }
}

/// When a watcher wants to hear about an upcoming birthday.
/// Exactly one model is active per watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertModel {
    /// Legacy model: fire n hours before the person's local midnight.
    HoursBefore(i64),
    /// Fire at a wall-clock time `days` before the occurrence date,
    /// in the watcher's own timezone.
    DaysBeforeAt { days: i64, hour: u32, minute: u32 },
}

impl Default for AlertModel {
    fn default() -> Self {
        AlertModel::HoursBefore(0)
    }
}

/// Composite timer key. At most one live timer per (person, watcher) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub person_id: i64,
    pub watcher_id: i64,
}

/// Everything a fired timer or a catch-up delivery needs to render and
/// send one alert.
#[derive(Debug, Clone)]
pub struct PlannedAlert {
    pub person_id: i64,
    pub person_name: String,
    pub birth_day: u32,
    pub birth_month: u32,
    pub birth_year: Option<i32>,
    pub watcher_id: i64,
    pub watcher_tz: i32,
    pub chat_id: i64,
    /// Occurrence date in the person's local calendar. This is the claim
    /// key date, not the watcher-local trigger date.
    pub occurrence: NaiveDate,
    pub trigger_utc: DateTime<Utc>,
}

impl PlannedAlert {
    pub fn key(&self) -> JobKey {
        JobKey {
            person_id: self.person_id,
            watcher_id: self.watcher_id,
        }
    }
}

/// Rebuild outcome, for logs and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RebuildCounts {
    pub scheduled: usize,
    pub caught_up: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceMode {
    /// Pause timers only.
    Soft,
    /// Pause timers and stop the host process after a short grace delay.
    Hard,
}

impl MaintenanceMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "hard" => MaintenanceMode::Hard,
            _ => MaintenanceMode::Soft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceMode::Soft => "soft",
            MaintenanceMode::Hard => "hard",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn birthday_requires_both_halves() {
        let mut u = UserRecord {
            user_id: 1,
            username: None,
            chat_id: None,
            birth_day: Some(29),
            birth_month: None,
            birth_year: None,
            tz_offset: 0,
            alert: AlertModel::default(),
        };
        assert_eq!(u.birthday(), None);
        u.birth_month = Some(2);
        assert_eq!(u.birthday(), Some((29, 2)));
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let u = UserRecord {
            user_id: 42,
            username: None,
            chat_id: None,
            birth_day: None,
            birth_month: None,
            birth_year: None,
            tz_offset: 0,
            alert: AlertModel::default(),
        };
        assert_eq!(u.display_name(), "id:42");
    }

    #[test]
    fn maintenance_mode_round_trips() {
        assert_eq!(MaintenanceMode::parse("hard"), MaintenanceMode::Hard);
        assert_eq!(MaintenanceMode::parse("soft"), MaintenanceMode::Soft);
        assert_eq!(MaintenanceMode::parse("bogus"), MaintenanceMode::Soft);
        assert_eq!(MaintenanceMode::Hard.as_str(), "hard");
    }
}
