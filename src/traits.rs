use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::types::{MaintenanceMode, UserRecord};

/// Read surface over the user directory.
///
/// Reads are read-mostly and may race concurrent mutation; any staleness is
/// self-correcting at the next rebuild or targeted reschedule.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Every registered user with a complete (day, month) birthday.
    async fn list_with_birthday(&self) -> anyhow::Result<Vec<UserRecord>>;

    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<UserRecord>>;
}

/// Relationship lookups feeding follower resolution.
#[async_trait]
pub trait RelationshipGraph: Send + Sync {
    /// Owners of friend edges pointing at this person: matched by id, and by
    /// lower-cased handle for edges recorded against an unregistered handle.
    /// Friend edges are one-directional (owner watches target).
    async fn direct_watchers(
        &self,
        person_id: i64,
        handle_lower: Option<&str>,
    ) -> anyhow::Result<Vec<i64>>;

    /// Every other member with a known id of any group the person belongs
    /// to. Co-membership is symmetric. Handle-only members are excluded:
    /// they cannot receive messages.
    async fn co_member_watchers(&self, person_id: i64) -> anyhow::Result<Vec<i64>>;
}

/// Outbound message transport. Implementations return an error on
/// recoverable transport failure instead of panicking; callers log and
/// move on.
#[async_trait]
pub trait OutboundNotifier: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;
}

/// Durable at-most-once claim store over (person, watcher, occurrence date).
///
/// The claim is the sole admission gate before any outbound send, and must
/// stay atomic under true concurrency: a leftover timer firing at the same
/// moment a rebuild's catch-up branch evaluates the same key.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Atomic insert-if-absent. True only for the first caller of a key.
    async fn claim(
        &self,
        person_id: i64,
        watcher_id: i64,
        occurred_on: NaiveDate,
    ) -> anyhow::Result<bool>;

    /// Drop claims recorded before the cutoff. Returns rows removed.
    async fn purge_claims_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}

/// Durable maintenance on/off flag written by the admin surface and polled
/// by the maintenance watcher.
#[async_trait]
pub trait MaintenanceFlagStore: Send + Sync {
    async fn get_maintenance(&self) -> anyhow::Result<(bool, MaintenanceMode)>;

    async fn set_maintenance(&self, enabled: bool, mode: MaintenanceMode) -> anyhow::Result<()>;
}
