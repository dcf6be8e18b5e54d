mod channels;
mod compose;
mod config;
mod followers;
mod jobs;
mod maintenance;
mod occurrence;
mod scheduler;
mod state;
mod timezone;
mod traits;
mod trigger;
mod types;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = PathBuf::from("config.toml");
    let config = config::AppConfig::load(&config_path)?;

    let store = Arc::new(state::SqliteStore::new(&config.state.db_path).await?);
    let notifier = Arc::new(channels::TelegramNotifier::new(&config.telegram.bot_token));

    let scheduler = scheduler::BirthdayScheduler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        notifier,
        &config.scheduler,
    );

    // Initial pass: arm everything inside the horizon and catch up any
    // triggers missed while the daemon was down.
    match scheduler.rebuild(config.scheduler.horizon_days).await {
        Ok(counts) => info!(
            scheduled = counts.scheduled,
            caught_up = counts.caught_up,
            "initial rebuild complete"
        ),
        Err(e) => error!("initial rebuild failed: {}", e),
    }

    let refresh = jobs::spawn_daily_refresh(
        scheduler.clone(),
        config.scheduler.daily_refresh_hour,
        config.scheduler.default_tz_offset,
    );
    let cleanup = jobs::spawn_claim_cleanup(store.clone(), config.scheduler.dedup_retention_days);

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let controller = maintenance::MaintenanceController::new(
        scheduler.clone(),
        store.clone(),
        stop_tx,
        &config.maintenance,
    );
    let watcher = controller.spawn_watcher();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received, shutting down"),
        _ = stop_rx.changed() => info!("maintenance hard stop, shutting down"),
    }

    refresh.abort();
    cleanup.abort();
    watcher.abort();

    // Drop the timers so a restart cannot race its own catch-up pass;
    // everything re-arms from source data on the next start.
    let cancelled = scheduler.cancel_all();
    info!(cancelled, "shutdown complete");
    Ok(())
}
