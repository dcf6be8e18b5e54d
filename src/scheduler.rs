//! The birthday job scheduler: computes trigger instants for every
//! (person, watcher) pair inside the horizon, keeps one live one-shot
//! timer per pair, and funnels every delivery through the claim gate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::compose;
use crate::config::SchedulerConfig;
use crate::followers::FollowerResolver;
use crate::occurrence;
use crate::timezone;
use crate::traits::{ClaimStore, OutboundNotifier, RelationshipGraph, UserDirectory};
use crate::trigger;
use crate::types::{JobKey, PlannedAlert, RebuildCounts};

/// A pending one-shot timer and the alert it will deliver.
struct ScheduledJob {
    alert: PlannedAlert,
    handle: JoinHandle<()>,
}

pub struct BirthdayScheduler {
    /// Self-reference for timer tasks; they no-op once the scheduler is gone.
    me: Weak<Self>,
    directory: Arc<dyn UserDirectory>,
    resolver: FollowerResolver,
    claims: Arc<dyn ClaimStore>,
    notifier: Arc<dyn OutboundNotifier>,
    /// Authoritative timer index. Listing and cancellation go through this
    /// map only, never through runtime internals.
    jobs: Mutex<HashMap<JobKey, ScheduledJob>>,
    last_horizon: AtomicI64,
    catch_up_window_hours: i64,
    send_burst: usize,
    send_pause: StdDuration,
}

impl BirthdayScheduler {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        graph: Arc<dyn RelationshipGraph>,
        claims: Arc<dyn ClaimStore>,
        notifier: Arc<dyn OutboundNotifier>,
        cfg: &SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            directory,
            resolver: FollowerResolver::new(graph),
            claims,
            notifier,
            jobs: Mutex::new(HashMap::new()),
            last_horizon: AtomicI64::new(cfg.horizon_days),
            catch_up_window_hours: cfg.catch_up_window_hours,
            send_burst: cfg.send_burst,
            send_pause: StdDuration::from_secs(cfg.send_pause_secs),
        })
    }

    /// Rebuild the timer set from current directory data: arm everything
    /// inside the horizon, catch up recently missed triggers, drop stale
    /// ones. Idempotent for unchanged data; one live job per key.
    pub async fn rebuild(&self, horizon_days: i64) -> anyhow::Result<RebuildCounts> {
        self.rebuild_at(horizon_days, Utc::now()).await
    }

    pub(crate) async fn rebuild_at(
        &self,
        horizon_days: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RebuildCounts> {
        self.last_horizon.store(horizon_days, Ordering::Relaxed);

        let persons = match self.directory.list_with_birthday().await {
            Ok(rows) => rows,
            Err(e) => {
                // Existing timers stay armed; only this pass is lost.
                error!("directory read failed, keeping current timers: {}", e);
                return Err(e);
            }
        };

        let today_utc = now.date_naive();
        let mut counts = RebuildCounts::default();
        let mut burst = 0usize;

        for person in persons {
            let Some((day, month)) = person.birthday() else {
                continue;
            };
            let Some(occurrence) = occurrence::next_occurrence(day, month, today_utc) else {
                warn!(
                    person_id = person.user_id,
                    day, month, "impossible birthday, skipping this pass"
                );
                continue;
            };
            if (occurrence - today_utc).num_days() > horizon_days {
                continue;
            }

            let watchers = self
                .resolver
                .resolve(person.user_id, person.handle_lower().as_deref())
                .await;

            for watcher_id in watchers {
                let watcher = match self.directory.get_user(watcher_id).await {
                    Ok(Some(w)) => w,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(watcher_id, "watcher lookup failed: {}", e);
                        continue;
                    }
                };
                let Some(chat_id) = watcher.chat_id else {
                    // Watcher has no messaging target yet.
                    continue;
                };

                let plan = trigger::plan_trigger(
                    occurrence,
                    person.tz_offset,
                    watcher.tz_offset,
                    watcher.alert,
                );
                let alert = PlannedAlert {
                    person_id: person.user_id,
                    person_name: person.display_name(),
                    birth_day: day,
                    birth_month: month,
                    birth_year: person.birth_year,
                    watcher_id,
                    watcher_tz: watcher.tz_offset,
                    chat_id,
                    occurrence: plan.occurrence,
                    trigger_utc: plan.trigger_utc,
                };

                // A trigger exactly at `now` counts as due, not upcoming.
                if plan.trigger_utc <= now {
                    if now - plan.trigger_utc <= Duration::hours(self.catch_up_window_hours) {
                        match self.deliver(&alert, now).await {
                            Ok(true) => {
                                counts.caught_up += 1;
                                burst += 1;
                                if self.send_burst > 0 && burst >= self.send_burst {
                                    burst = 0;
                                    tokio::time::sleep(self.send_pause).await;
                                }
                            }
                            Ok(false) => debug!(
                                person_id = alert.person_id,
                                watcher_id, "occurrence already claimed, skipping catch-up"
                            ),
                            Err(e) => warn!(
                                person_id = alert.person_id,
                                watcher_id, "catch-up claim failed: {}", e
                            ),
                        }
                    } else {
                        debug!(
                            person_id = alert.person_id,
                            watcher_id, "trigger too old, dropping"
                        );
                    }
                    continue;
                }

                debug!(
                    person_id = alert.person_id,
                    watcher_id,
                    trigger = %plan.trigger_utc,
                    days_until = plan.days_until,
                    "arming alert"
                );
                self.arm(alert, now);
                counts.scheduled += 1;
            }
        }

        info!(
            scheduled = counts.scheduled,
            caught_up = counts.caught_up,
            horizon_days,
            "rebuild complete"
        );
        Ok(counts)
    }

    /// Arm or replace the one-shot timer for the alert's (person, watcher)
    /// key. The superseded timer, if any, is cancelled first.
    fn arm(&self, alert: PlannedAlert, now: DateTime<Utc>) {
        let key = alert.key();
        let delay = (alert.trigger_utc - now)
            .to_std()
            .unwrap_or(StdDuration::ZERO);

        let me = self.me.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(scheduler) = me.upgrade() {
                scheduler.fire(key).await;
            }
        });

        let mut jobs = self.lock_jobs();
        if let Some(old) = jobs.remove(&key) {
            old.handle.abort();
        }
        jobs.insert(key, ScheduledJob { alert, handle });
    }

    /// Timer callback. Losing the race against cancellation or a concurrent
    /// catch-up is fine: the claim gate turns a redundant fire into a no-op.
    pub(crate) async fn fire(&self, key: JobKey) {
        let alert = {
            let mut jobs = self.lock_jobs();
            match jobs.remove(&key) {
                Some(job) => job.alert,
                None => return,
            }
        };

        match self.deliver(&alert, Utc::now()).await {
            Ok(true) => info!(
                person_id = key.person_id,
                watcher_id = key.watcher_id,
                "alert delivered"
            ),
            Ok(false) => debug!(
                person_id = key.person_id,
                watcher_id = key.watcher_id,
                "occurrence already claimed, skipping"
            ),
            Err(e) => warn!(
                person_id = key.person_id,
                watcher_id = key.watcher_id,
                "delivery failed: {}",
                e
            ),
        }
    }

    /// Claim-then-send. True when this call won the claim. The claim stays
    /// consumed even if the send fails: no same-cycle retry, the person's
    /// next occurrence is the next opportunity.
    async fn deliver(&self, alert: &PlannedAlert, now: DateTime<Utc>) -> anyhow::Result<bool> {
        if !self
            .claims
            .claim(alert.person_id, alert.watcher_id, alert.occurrence)
            .await?
        {
            return Ok(false);
        }

        let today_watcher = timezone::today_in(now, alert.watcher_tz);
        let (occurrence, days_left) =
            match occurrence::next_occurrence(alert.birth_day, alert.birth_month, today_watcher) {
                Some(next) => (next, (next - today_watcher).num_days()),
                None => (alert.occurrence, 0),
            };
        let text = compose::alert_text(&alert.person_name, alert.birth_year, occurrence, days_left);

        if let Err(e) = self.notifier.send(alert.chat_id, &text).await {
            warn!(
                watcher_id = alert.watcher_id,
                chat_id = alert.chat_id,
                "send failed, claim stays consumed: {}",
                e
            );
        }
        Ok(true)
    }

    /// Cancel this person's jobs and rebuild with the last horizon.
    /// Used when a birthday is edited or a relationship changes.
    pub async fn reschedule_for_person(&self, person_id: i64) -> anyhow::Result<RebuildCounts> {
        self.reschedule_for_person_at(person_id, Utc::now()).await
    }

    pub(crate) async fn reschedule_for_person_at(
        &self,
        person_id: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RebuildCounts> {
        let cancelled = self.cancel_where(|k| k.person_id == person_id);
        debug!(person_id, cancelled, "rescheduling for person");
        self.rebuild_at(self.last_horizon(), now).await
    }

    /// Cancel this watcher's jobs and rebuild with the last horizon.
    /// Used when a watcher's timezone or alert model changes.
    pub async fn reschedule_for_watcher(&self, watcher_id: i64) -> anyhow::Result<RebuildCounts> {
        self.reschedule_for_watcher_at(watcher_id, Utc::now()).await
    }

    pub(crate) async fn reschedule_for_watcher_at(
        &self,
        watcher_id: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RebuildCounts> {
        let cancelled = self.cancel_where(|k| k.watcher_id == watcher_id);
        debug!(watcher_id, cancelled, "rescheduling for watcher");
        self.rebuild_at(self.last_horizon(), now).await
    }

    /// Cancel every armed timer. Timer state is fully re-derivable from
    /// source data, so nothing is snapshotted.
    pub fn cancel_all(&self) -> usize {
        self.cancel_where(|_| true)
    }

    fn cancel_where(&self, pred: impl Fn(&JobKey) -> bool) -> usize {
        let mut jobs = self.lock_jobs();
        let keys: Vec<JobKey> = jobs.keys().copied().filter(|k| pred(k)).collect();
        for key in &keys {
            if let Some(job) = jobs.remove(key) {
                job.handle.abort();
            }
        }
        keys.len()
    }

    pub fn active_jobs(&self) -> usize {
        self.lock_jobs().len()
    }

    pub fn last_horizon(&self) -> i64 {
        self.last_horizon.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn job_trigger(&self, key: JobKey) -> Option<DateTime<Utc>> {
        self.lock_jobs().get(&key).map(|j| j.alert.trigger_utc)
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<JobKey, ScheduledJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
