//! Test infrastructure: a recording mock notifier and a fully wired
//! scheduler over a throwaway SQLite file.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::SchedulerConfig;
use crate::scheduler::BirthdayScheduler;
use crate::state::SqliteStore;
use crate::traits::OutboundNotifier;

/// Records outbound sends; can be flipped to fail every send.
pub struct MockNotifier {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub fail_sends: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl OutboundNotifier for MockNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        if self.fail_sends.load(Ordering::Relaxed) {
            anyhow::bail!("transport down");
        }
        self.sent.lock().await.push((chat_id, text.to_string()));
        Ok(())
    }
}

/// A wired scheduler, its store, and the mock transport behind it.
pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub notifier: Arc<MockNotifier>,
    pub scheduler: Arc<BirthdayScheduler>,
    _db: tempfile::NamedTempFile,
}

pub async fn harness() -> Harness {
    let db = tempfile::NamedTempFile::new().unwrap();
    let store = Arc::new(SqliteStore::new(db.path().to_str().unwrap()).await.unwrap());
    let notifier = Arc::new(MockNotifier::new());
    let scheduler = BirthdayScheduler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        notifier.clone(),
        &SchedulerConfig::default(),
    );
    Harness {
        store,
        notifier,
        scheduler,
        _db: db,
    }
}

impl Harness {
    /// Registered, reachable user. Chat id is `user_id * 100` by convention.
    pub async fn seed_user(&self, user_id: i64, username: &str, tz: i32) {
        self.store
            .ensure_user(user_id, Some(username), Some(user_id * 100))
            .await
            .unwrap();
        self.store.set_timezone(user_id, tz).await.unwrap();
    }

    pub async fn seed_person(
        &self,
        user_id: i64,
        username: &str,
        birthday: (u32, u32, Option<i32>),
        tz: i32,
    ) {
        self.seed_user(user_id, username, tz).await;
        let (day, month, year) = birthday;
        self.store
            .set_birthday(user_id, day, month, year)
            .await
            .unwrap();
    }
}
