use sqlx::SqlitePool;
use tracing::info;

/// Startup-time schema migrations. Idempotent via `IF NOT EXISTS`; queries
/// elsewhere assume this has run and never introspect or repair schema at
/// read time.
pub(crate) async fn run(pool: &SqlitePool) -> anyhow::Result<()> {
    migrate_users(pool).await?;
    migrate_relations(pool).await?;
    migrate_claims(pool).await?;
    migrate_admin_state(pool).await?;
    info!("database migrations complete");
    Ok(())
}

async fn migrate_users(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id     INTEGER PRIMARY KEY,
            username    TEXT,
            chat_id     INTEGER,
            birth_day   INTEGER,
            birth_month INTEGER,
            birth_year  INTEGER,
            tz          INTEGER NOT NULL DEFAULT 0,
            alert_hours INTEGER NOT NULL DEFAULT 0,
            alert_days  INTEGER,
            alert_time  TEXT,
            created_at  TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_username ON users(LOWER(username))")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_users_bday
         ON users(birth_month, birth_day)
         WHERE birth_day IS NOT NULL AND birth_month IS NOT NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn migrate_relations(pool: &SqlitePool) -> anyhow::Result<()> {
    // Friend edges are one-directional: owner watches target. The target
    // is either a registered id or a bare lower-cased handle.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS friends (
            owner_user_id   INTEGER NOT NULL,
            friend_user_id  INTEGER,
            friend_username TEXT,
            birth_day       INTEGER,
            birth_month     INTEGER,
            birth_year      INTEGER,
            created_at      TEXT NOT NULL,
            PRIMARY KEY (owner_user_id, friend_user_id, friend_username)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_friends_owner ON friends(owner_user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_friends_target_id ON friends(friend_user_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_friends_target_handle ON friends(LOWER(friend_username))",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            group_id   TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            code       TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS group_members (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id        TEXT NOT NULL,
            member_user_id  INTEGER,
            member_username TEXT,
            joined_at       TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_gm_group ON group_members(group_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_gm_member ON group_members(member_user_id)")
        .execute(pool)
        .await?;
    // Full unique indexes: SQLite UPSERT targets cannot use partial ones.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_gm_unique_id
         ON group_members(group_id, member_user_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_gm_unique_handle
         ON group_members(group_id, member_username)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn migrate_claims(pool: &SqlitePool) -> anyhow::Result<()> {
    // The composite primary key is what makes claim() atomic: the first
    // INSERT OR IGNORE wins, every later one affects zero rows.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sent_alerts (
            person_id   INTEGER NOT NULL,
            watcher_id  INTEGER NOT NULL,
            occurred_on TEXT NOT NULL,
            claimed_at  TEXT NOT NULL,
            PRIMARY KEY (person_id, watcher_id, occurred_on)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sent_alerts_claimed ON sent_alerts(claimed_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn migrate_admin_state(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS admin_state (
            key        TEXT PRIMARY KEY,
            value      TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
