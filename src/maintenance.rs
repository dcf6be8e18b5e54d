//! Pause/resume of the whole timer set for operational windows, driven by
//! a durable flag the admin surface writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::MaintenanceConfig;
use crate::scheduler::BirthdayScheduler;
use crate::traits::MaintenanceFlagStore;
use crate::types::MaintenanceMode;

pub struct MaintenanceController {
    scheduler: Arc<BirthdayScheduler>,
    flags: Arc<dyn MaintenanceFlagStore>,
    /// Host shutdown signal for hard mode.
    stop_tx: watch::Sender<bool>,
    active: AtomicBool,
    hard_stop_grace: Duration,
    poll_interval: Duration,
}

impl MaintenanceController {
    pub fn new(
        scheduler: Arc<BirthdayScheduler>,
        flags: Arc<dyn MaintenanceFlagStore>,
        stop_tx: watch::Sender<bool>,
        cfg: &MaintenanceConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            flags,
            stop_tx,
            active: AtomicBool::new(false),
            hard_stop_grace: Duration::from_secs(cfg.hard_stop_grace_secs),
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Cancel all timers. Their state is re-derivable, so nothing is
    /// snapshotted. Hard mode additionally asks the host to stop after a
    /// short grace delay.
    pub async fn enter(&self, mode: MaintenanceMode) {
        self.active.store(true, Ordering::Relaxed);
        let cancelled = self.scheduler.cancel_all();
        info!(cancelled, mode = mode.as_str(), "maintenance: entering");

        if mode == MaintenanceMode::Hard {
            tokio::time::sleep(self.hard_stop_grace).await;
            let _ = self.stop_tx.send(true);
        }
    }

    /// Re-arm everything from current source data.
    pub async fn exit(&self) {
        self.active.store(false, Ordering::Relaxed);
        match self.scheduler.rebuild(self.scheduler.last_horizon()).await {
            Ok(counts) => info!(
                scheduled = counts.scheduled,
                caught_up = counts.caught_up,
                "maintenance: leaving"
            ),
            Err(e) => error!("maintenance: rebuild on exit failed: {}", e),
        }
    }

    /// Poll the durable flag and drive enter/exit transitions.
    pub fn spawn_watcher(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.poll_interval).await;
                if let Err(e) = self.tick().await {
                    warn!("maintenance flag poll failed: {}", e);
                }
            }
        })
    }

    pub(crate) async fn tick(&self) -> anyhow::Result<()> {
        let (enabled, mode) = self.flags.get_maintenance().await?;
        if enabled && !self.is_active() {
            self.enter(mode).await;
        } else if !enabled && self.is_active() {
            self.exit().await;
        }
        Ok(())
    }
}
