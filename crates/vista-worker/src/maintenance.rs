//! Periodic job table maintenance.
//!
//! The stale-job reaper hands `running` jobs whose worker vanished (crash,
//! abandoned shutdown) back to their queue. The retention sweep deletes
//! terminal jobs once they are older than the retention window, which also
//! removes bridge jobs whose caller gave up.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use vista_core::models::QueueName;
use vista_db::JobStore;

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Queues to reap, each with its handler timeout.
    pub queues: Vec<(QueueName, Duration)>,
    /// Zero disables the reaper.
    pub reap_interval: Duration,
    /// Added to a queue's timeout before a running job counts as stale.
    pub grace_period: Duration,
    /// `None` disables the retention sweep.
    pub retention: Option<chrono::Duration>,
}

/// Reap every configured queue once. Returns the number of jobs handed back.
pub async fn reap_stale_jobs(store: &dyn JobStore, config: &MaintenanceConfig) -> u64 {
    let mut total = 0;
    for (queue, timeout) in &config.queues {
        let stale_after = *timeout + config.grace_period;
        let stale_before =
            Utc::now() - chrono::Duration::milliseconds(stale_after.as_millis() as i64);

        match store.reap_stale(*queue, stale_before).await {
            Ok(reaped) => total += reaped,
            Err(e) => tracing::error!(queue = %queue, error = %e, "Stale job reaper failed"),
        }
    }
    total
}

/// Delete terminal jobs finalized before the retention window.
pub async fn sweep_finished_jobs(store: &dyn JobStore, retention: chrono::Duration) -> u64 {
    match store.delete_finished_before(Utc::now() - retention).await {
        Ok(deleted) => {
            if deleted > 0 {
                tracing::info!(deleted, "Deleted finished jobs past retention");
            }
            deleted
        }
        Err(e) => {
            tracing::error!(error = %e, "Job retention sweep failed");
            0
        }
    }
}

/// Run the reaper and the retention sweep until `shutdown` is cancelled.
pub async fn run_maintenance(
    store: Arc<dyn JobStore>,
    config: MaintenanceConfig,
    shutdown: CancellationToken,
) {
    let reaper_enabled = !config.reap_interval.is_zero() && !config.queues.is_empty();
    // An interval cannot be zero; a disabled task just never fires.
    let mut reap = tokio::time::interval(if reaper_enabled {
        config.reap_interval
    } else {
        RETENTION_SWEEP_INTERVAL
    });
    reap.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut sweep = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        reaper = reaper_enabled,
        reap_interval_secs = config.reap_interval.as_secs(),
        retention_days = config.retention.map(|r| r.num_days()),
        "Job maintenance started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = reap.tick(), if reaper_enabled => {
                reap_stale_jobs(store.as_ref(), &config).await;
            }
            _ = sweep.tick(), if config.retention.is_some() => {
                if let Some(retention) = config.retention {
                    sweep_finished_jobs(store.as_ref(), retention).await;
                }
            }
        }
    }

    tracing::debug!("Job maintenance stopped");
}
