//! SQLite-backed implementation of the directory, relationship-graph,
//! claim-store, and maintenance-flag contracts.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::traits::{ClaimStore, MaintenanceFlagStore, RelationshipGraph, UserDirectory};
use crate::types::{AlertModel, MaintenanceMode, UserRecord};

mod migrations;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        migrations::run(&pool).await?;

        Ok(Self { pool })
    }

    fn row_to_user(row: &SqliteRow) -> UserRecord {
        let alert_days: Option<i64> = row.get("alert_days");
        let alert = match alert_days {
            Some(days) => {
                let (hour, minute) = parse_hhmm(row.get::<Option<String>, _>("alert_time"));
                AlertModel::DaysBeforeAt { days, hour, minute }
            }
            None => AlertModel::HoursBefore(row.get::<i64, _>("alert_hours")),
        };

        UserRecord {
            user_id: row.get("user_id"),
            username: row.get("username"),
            chat_id: row.get("chat_id"),
            birth_day: opt_u32(row.get("birth_day")),
            birth_month: opt_u32(row.get("birth_month")),
            birth_year: row.get::<Option<i64>, _>("birth_year").map(|y| y as i32),
            tz_offset: row.get::<i64, _>("tz") as i32,
            alert,
        }
    }

    // ---------- write surface used by the surrounding bot ----------

    /// Insert the user if unseen; refresh username and, when given, chat id.
    pub async fn ensure_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        chat_id: Option<i64>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (user_id, username, created_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET username = excluded.username",
        )
        .bind(user_id)
        .bind(username)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if let Some(chat) = chat_id {
            sqlx::query("UPDATE users SET chat_id = ? WHERE user_id = ?")
                .bind(chat)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn set_birthday(
        &self,
        user_id: i64,
        day: u32,
        month: u32,
        year: Option<i32>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET birth_day = ?, birth_month = ?, birth_year = ? WHERE user_id = ?",
        )
        .bind(day as i64)
        .bind(month as i64)
        .bind(year.map(|y| y as i64))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_timezone(&self, user_id: i64, tz_hours: i32) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET tz = ? WHERE user_id = ?")
            .bind(tz_hours as i64)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Accepts free-form timezone input ("3", "+3", "UTC+2", "GMT-4") the
    /// way the settings surface collects it. Returns the stored offset.
    pub async fn set_timezone_input(&self, user_id: i64, value: &str) -> anyhow::Result<i32> {
        let hours = crate::timezone::parse_offset(value);
        self.set_timezone(user_id, hours).await?;
        Ok(hours)
    }

    /// Switch the watcher to the legacy hours-before model.
    pub async fn set_alert_hours(&self, user_id: i64, hours: i64) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET alert_hours = ?, alert_days = NULL, alert_time = NULL
             WHERE user_id = ?",
        )
        .bind(hours)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Switch the watcher to the days-before-at-time model.
    pub async fn set_alert_days_at(
        &self,
        user_id: i64,
        days: i64,
        hour: u32,
        minute: u32,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET alert_days = ?, alert_time = ? WHERE user_id = ?")
            .bind(days)
            .bind(format!("{:02}:{:02}", hour, minute))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a friend edge: owner starts watching the target, addressed by
    /// id or, for unregistered targets, by handle.
    pub async fn add_friend(
        &self,
        owner_user_id: i64,
        friend_user_id: Option<i64>,
        friend_username: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO friends
                 (owner_user_id, friend_user_id, friend_username, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(owner_user_id)
        .bind(friend_user_id)
        .bind(friend_username.map(|u| u.to_lowercase()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_friend(
        &self,
        owner_user_id: i64,
        friend_user_id: Option<i64>,
        friend_username: Option<&str>,
    ) -> anyhow::Result<bool> {
        let result = if let Some(fid) = friend_user_id {
            sqlx::query("DELETE FROM friends WHERE owner_user_id = ? AND friend_user_id = ?")
                .bind(owner_user_id)
                .bind(fid)
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query(
                "DELETE FROM friends
                 WHERE owner_user_id = ? AND LOWER(friend_username) = LOWER(?)",
            )
            .bind(owner_user_id)
            .bind(friend_username.unwrap_or_default())
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected() > 0)
    }

    /// Returns (group_id, join code).
    pub async fn create_group(&self, name: &str) -> anyhow::Result<(String, String)> {
        let group_id = uuid::Uuid::new_v4().to_string();
        let code = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        sqlx::query("INSERT INTO groups (group_id, name, code, created_at) VALUES (?, ?, ?, ?)")
            .bind(&group_id)
            .bind(name)
            .bind(&code)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok((group_id, code))
    }

    pub async fn add_group_member(
        &self,
        group_id: &str,
        member_user_id: Option<i64>,
        member_username: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO group_members
                 (group_id, member_user_id, member_username, joined_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(group_id)
        .bind(member_user_id)
        .bind(member_username.map(|u| u.to_lowercase()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_group_member(
        &self,
        group_id: &str,
        member_user_id: i64,
    ) -> anyhow::Result<bool> {
        let result =
            sqlx::query("DELETE FROM group_members WHERE group_id = ? AND member_user_id = ?")
                .bind(group_id)
                .bind(member_user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn opt_u32(v: Option<i64>) -> Option<u32> {
    v.and_then(|n| u32::try_from(n).ok())
}

/// Parse "HH:MM"; malformed or missing values fall back to midnight.
fn parse_hhmm(value: Option<String>) -> (u32, u32) {
    let Some(s) = value else { return (0, 0) };
    let mut parts = s.splitn(2, ':');
    let hour = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    let minute = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    match (hour, minute) {
        (Some(h), Some(m)) if h < 24 && m < 60 => (h, m),
        _ => (0, 0),
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn list_with_birthday(&self) -> anyhow::Result<Vec<UserRecord>> {
        let rows = sqlx::query(
            "SELECT user_id, username, chat_id, birth_day, birth_month, birth_year,
                    tz, alert_hours, alert_days, alert_time
             FROM users
             WHERE birth_day IS NOT NULL AND birth_month IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_user).collect())
    }

    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT user_id, username, chat_id, birth_day, birth_month, birth_year,
                    tz, alert_hours, alert_days, alert_time
             FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::row_to_user))
    }
}

#[async_trait]
impl RelationshipGraph for SqliteStore {
    async fn direct_watchers(
        &self,
        person_id: i64,
        handle_lower: Option<&str>,
    ) -> anyhow::Result<Vec<i64>> {
        let mut owners: Vec<i64> =
            sqlx::query("SELECT DISTINCT owner_user_id FROM friends WHERE friend_user_id = ?")
                .bind(person_id)
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|r| r.get::<i64, _>(0))
                .collect();

        // Edges recorded before the person registered carry only a handle.
        if let Some(handle) = handle_lower {
            let by_handle = sqlx::query(
                "SELECT DISTINCT owner_user_id FROM friends
                 WHERE friend_user_id IS NULL AND LOWER(friend_username) = ?",
            )
            .bind(handle)
            .fetch_all(&self.pool)
            .await?;
            owners.extend(by_handle.iter().map(|r| r.get::<i64, _>(0)));
        }

        Ok(owners)
    }

    async fn co_member_watchers(&self, person_id: i64) -> anyhow::Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT DISTINCT other.member_user_id
             FROM group_members mine
             JOIN group_members other ON other.group_id = mine.group_id
             WHERE mine.member_user_id = ?
               AND other.member_user_id IS NOT NULL
               AND other.member_user_id != ?",
        )
        .bind(person_id)
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>(0)).collect())
    }
}

#[async_trait]
impl ClaimStore for SqliteStore {
    async fn claim(
        &self,
        person_id: i64,
        watcher_id: i64,
        occurred_on: NaiveDate,
    ) -> anyhow::Result<bool> {
        // INSERT OR IGNORE against the composite primary key is the atomic
        // gate; a read-then-write here would reopen the duplicate window.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sent_alerts (person_id, watcher_id, occurred_on, claimed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(person_id)
        .bind(watcher_id)
        .bind(occurred_on.format("%Y-%m-%d").to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_claims_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sent_alerts WHERE claimed_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MaintenanceFlagStore for SqliteStore {
    async fn get_maintenance(&self) -> anyhow::Result<(bool, MaintenanceMode)> {
        let row = sqlx::query("SELECT value FROM admin_state WHERE key = 'maintenance'")
            .fetch_optional(&self.pool)
            .await?;
        let value: String = match row {
            Some(r) => r.get::<Option<String>, _>(0).unwrap_or_default(),
            None => String::new(),
        };
        // Stored as "on:soft" / "on:hard" / "off:soft"; absent means off.
        let mut parts = value.splitn(2, ':');
        let enabled = parts.next() == Some("on");
        let mode = MaintenanceMode::parse(parts.next().unwrap_or("soft"));
        Ok((enabled, mode))
    }

    async fn set_maintenance(&self, enabled: bool, mode: MaintenanceMode) -> anyhow::Result<()> {
        let value = format!("{}:{}", if enabled { "on" } else { "off" }, mode.as_str());
        sqlx::query(
            "INSERT INTO admin_state (key, value, updated_at) VALUES ('maintenance', ?, ?)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
        )
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (SqliteStore, tempfile::NamedTempFile) {
        let db_file = tempfile::NamedTempFile::new().unwrap();
        let store = SqliteStore::new(db_file.path().to_str().unwrap())
            .await
            .unwrap();
        (store, db_file)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn claim_is_true_exactly_once() {
        let (store, _db) = setup().await;
        let d = date(2024, 3, 1);
        assert!(store.claim(1, 2, d).await.unwrap());
        assert!(!store.claim(1, 2, d).await.unwrap());
        assert!(!store.claim(1, 2, d).await.unwrap());
        // Different occurrence is a fresh key.
        assert!(store.claim(1, 2, date(2025, 3, 1)).await.unwrap());
        // So is a different watcher.
        assert!(store.claim(1, 3, d).await.unwrap());
    }

    #[tokio::test]
    async fn purge_removes_only_old_claims() {
        let (store, _db) = setup().await;
        store.claim(1, 2, date(2024, 3, 1)).await.unwrap();
        store.claim(1, 3, date(2024, 3, 1)).await.unwrap();

        // Everything was claimed "now"; a cutoff in the past removes nothing.
        let removed = store
            .purge_claims_before(Utc::now() - chrono::Duration::days(400))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = store
            .purge_claims_before(Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(removed, 2);

        // Keys are claimable again once purged.
        assert!(store.claim(1, 2, date(2024, 3, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn friend_edges_are_one_directional() {
        let (store, _db) = setup().await;
        store.ensure_user(1, Some("alice"), None).await.unwrap();
        store.ensure_user(2, Some("bob"), None).await.unwrap();
        store.add_friend(2, Some(1), None).await.unwrap();

        // Bob watches alice...
        assert_eq!(store.direct_watchers(1, None).await.unwrap(), vec![2]);
        // ...but alice does not watch bob.
        assert!(store.direct_watchers(2, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn handle_edges_match_unregistered_targets() {
        let (store, _db) = setup().await;
        store.ensure_user(2, Some("bob"), None).await.unwrap();
        store.add_friend(2, None, Some("Alice")).await.unwrap();

        assert_eq!(
            store.direct_watchers(1, Some("alice")).await.unwrap(),
            vec![2]
        );
        // No handle given, no match.
        assert!(store.direct_watchers(1, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn co_membership_is_symmetric_excluding_self() {
        let (store, _db) = setup().await;
        let (gid, _code) = store.create_group("office").await.unwrap();
        store.add_group_member(&gid, Some(1), None).await.unwrap();
        store.add_group_member(&gid, Some(2), None).await.unwrap();
        // Handle-only member: tracked, but never a watcher.
        store
            .add_group_member(&gid, None, Some("ghost"))
            .await
            .unwrap();

        assert_eq!(store.co_member_watchers(1).await.unwrap(), vec![2]);
        assert_eq!(store.co_member_watchers(2).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn shared_membership_across_groups_yields_one_row() {
        let (store, _db) = setup().await;
        let (g1, _) = store.create_group("a").await.unwrap();
        let (g2, _) = store.create_group("b").await.unwrap();
        for gid in [&g1, &g2] {
            store.add_group_member(gid, Some(1), None).await.unwrap();
            store.add_group_member(gid, Some(2), None).await.unwrap();
        }
        assert_eq!(store.co_member_watchers(1).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn alert_model_resolution_prefers_days() {
        let (store, _db) = setup().await;
        store.ensure_user(1, Some("w"), Some(100)).await.unwrap();

        let user = store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.alert, AlertModel::HoursBefore(0));

        store.set_alert_days_at(1, 3, 9, 30).await.unwrap();
        let user = store.get_user(1).await.unwrap().unwrap();
        assert_eq!(
            user.alert,
            AlertModel::DaysBeforeAt {
                days: 3,
                hour: 9,
                minute: 30
            }
        );

        // Switching back to the legacy model clears the day-based fields.
        store.set_alert_hours(1, 6).await.unwrap();
        let user = store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.alert, AlertModel::HoursBefore(6));
    }

    #[tokio::test]
    async fn free_form_timezone_input_is_parsed_and_stored() {
        let (store, _db) = setup().await;
        store.ensure_user(1, Some("w"), None).await.unwrap();

        assert_eq!(store.set_timezone_input(1, "UTC+2").await.unwrap(), 2);
        assert_eq!(store.get_user(1).await.unwrap().unwrap().tz_offset, 2);

        assert_eq!(store.set_timezone_input(1, "-11").await.unwrap(), -11);
        assert_eq!(store.get_user(1).await.unwrap().unwrap().tz_offset, -11);

        // Garbage falls back to UTC rather than failing.
        assert_eq!(store.set_timezone_input(1, "moonbase").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_alert_time_falls_back_to_midnight() {
        assert_eq!(parse_hhmm(Some("9:30".into())), (9, 30));
        assert_eq!(parse_hhmm(Some("25:00".into())), (0, 0));
        assert_eq!(parse_hhmm(Some("oops".into())), (0, 0));
        assert_eq!(parse_hhmm(None), (0, 0));
    }

    #[tokio::test]
    async fn maintenance_flag_round_trips() {
        let (store, _db) = setup().await;
        assert_eq!(
            store.get_maintenance().await.unwrap(),
            (false, MaintenanceMode::Soft)
        );

        store
            .set_maintenance(true, MaintenanceMode::Hard)
            .await
            .unwrap();
        assert_eq!(
            store.get_maintenance().await.unwrap(),
            (true, MaintenanceMode::Hard)
        );

        store
            .set_maintenance(false, MaintenanceMode::Soft)
            .await
            .unwrap();
        assert_eq!(
            store.get_maintenance().await.unwrap(),
            (false, MaintenanceMode::Soft)
        );
    }

    #[tokio::test]
    async fn list_with_birthday_filters_incomplete_rows() {
        let (store, _db) = setup().await;
        store.ensure_user(1, Some("full"), None).await.unwrap();
        store.set_birthday(1, 1, 3, Some(1990)).await.unwrap();
        store.ensure_user(2, Some("none"), None).await.unwrap();

        let rows = store.list_with_birthday().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, 1);
        assert_eq!(rows[0].birthday(), Some((1, 3)));
        assert_eq!(rows[0].birth_year, Some(1990));
    }
}
