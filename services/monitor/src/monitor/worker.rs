//! Host monitor background worker.
//!
//! Runs a monitoring pass on a periodic interval.

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, instrument};

use super::{CycleReport, HostMonitor};

/// Worker that runs the host monitor until shutdown.
pub struct MonitorWorker {
    monitor: HostMonitor,
}

impl MonitorWorker {
    pub fn new(monitor: HostMonitor) -> Self {
        Self { monitor }
    }

    /// Run the monitor worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.monitor.config().interval;
        info!(
            interval_secs = period.as_secs(),
            batch_size = self.monitor.config().batch_size,
            "Starting host monitor worker"
        );

        let mut interval = tokio::time::interval(period);
        // A slow pass delays the next one instead of triggering a burst.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Wait one full interval before the first pass.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.monitor.run_cycle().await;
                    log_report(&report);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Host monitor worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

fn log_report(report: &CycleReport) {
    if !report.ran {
        return;
    }
    if report.hosts_refreshed > 0
        || report.hosts_failed > 0
        || report.roles_reset > 0
        || !report.fetch_failures.is_empty()
        || report.lost_leadership.is_some()
    {
        info!(
            clusters_visited = report.clusters_visited,
            infra_envs_visited = report.infra_envs_visited,
            hosts_refreshed = report.hosts_refreshed,
            hosts_failed = report.hosts_failed,
            roles_refreshed = report.roles_refreshed,
            roles_failed = report.roles_failed,
            roles_reset = report.roles_reset,
            fetch_failures = report.fetch_failures.len(),
            lost_leadership = ?report.lost_leadership,
            "Host monitoring pass complete"
        );
    }
}
