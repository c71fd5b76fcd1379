//! Host monitoring passes.
//!
//! One pass runs three phases in order, each gated on leadership:
//!
//! 1. **Resetting roles**: clear auto-assign suggestions of clusters with an
//!    unsuggested auto-assigned host.
//! 2. **Monitoring clusters**: page through monitored clusters, order each
//!    cluster's hosts by readiness weight and refresh them one by one. Role
//!    suggestions are refreshed only when every host of the cluster has an
//!    inventory.
//! 3. **Monitoring infra-envs**: page through live infra-envs and refresh
//!    their unbound hosts.
//!
//! Losing leadership at any check ends the pass. Hosts not reached keep
//! matching the same predicates and are picked up by the next pass.

mod cursor;
mod refresh;
mod reset;
mod worker;

pub use cursor::{ClusterCursor, InfraEnvCursor};
pub use refresh::{
    DryRunRefresher, HostScope, RefreshDriver, RefreshError, RoleRefresher, StatusRefresher,
};
pub use reset::AutoAssignReset;
pub use worker::MonitorWorker;

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetmon_id::RequestId;
use fleetmon_reconcile::{
    infra_env_host_is_monitored, sort_hosts, InventoryCache, DEFAULT_MONITOR_BATCH_SIZE,
    DEFAULT_MONITOR_INTERVAL,
};
use tracing::{debug, info, instrument, warn};

use crate::leader::LeaderElector;
use crate::metrics::{MetricsReporter, OP_HOST_MONITORING};
use crate::store::MonitorStore;

/// Monitoring pass settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between passes.
    pub interval: Duration,

    /// Aggregates fetched per cursor page.
    pub batch_size: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            batch_size: DEFAULT_MONITOR_BATCH_SIZE,
        }
    }
}

/// Phases of a monitoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    ResettingRoles,
    MonitoringClusters,
    MonitoringInfraEnvs,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResettingRoles => "resetting_roles",
            Self::MonitoringClusters => "monitoring_clusters",
            Self::MonitoringInfraEnvs => "monitoring_infra_envs",
        })
    }
}

/// Statistics from one monitoring pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    /// False when the pass was skipped because this replica is a follower.
    pub ran: bool,
    pub roles_reset: u64,
    pub clusters_visited: u64,
    pub infra_envs_visited: u64,
    pub hosts_refreshed: u64,
    pub hosts_failed: u64,
    pub roles_refreshed: u64,
    pub roles_failed: u64,
    /// Phases whose scan was cut short by a store error.
    pub fetch_failures: Vec<CyclePhase>,
    /// Phase in which leadership was found lost, if it was.
    pub lost_leadership: Option<CyclePhase>,
}

/// Runs monitoring passes against a store.
#[derive(Clone)]
pub struct HostMonitor {
    store: Arc<dyn MonitorStore>,
    leader: Arc<dyn LeaderElector>,
    metrics: Arc<dyn MetricsReporter>,
    driver: RefreshDriver,
    reset: AutoAssignReset,
    config: MonitorConfig,
}

impl HostMonitor {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        leader: Arc<dyn LeaderElector>,
        status: Arc<dyn StatusRefresher>,
        role: Arc<dyn RoleRefresher>,
        metrics: Arc<dyn MetricsReporter>,
        config: MonitorConfig,
    ) -> Self {
        let driver = RefreshDriver::new(leader.clone(), status, role, metrics.clone());
        let reset = AutoAssignReset::new(store.clone(), leader.clone());
        Self {
            store,
            leader,
            metrics,
            driver,
            reset,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one monitoring pass.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        if !self.leader.is_leader() {
            debug!("Not a leader, skipping host monitoring");
            return report;
        }
        report.ran = true;

        let started = Instant::now();
        self.run_phases(&mut report).await;
        self.metrics.report_duration(
            OP_HOST_MONITORING,
            started.elapsed().as_secs_f64() * 1000.0,
        );
        report
    }

    async fn run_phases(&self, report: &mut CycleReport) {
        for phase in [
            CyclePhase::ResettingRoles,
            CyclePhase::MonitoringClusters,
            CyclePhase::MonitoringInfraEnvs,
        ] {
            if !self.leader.is_leader() {
                info!(%phase, "Lost leadership, ending host monitoring pass");
                report.lost_leadership = Some(phase);
                return;
            }

            let request_id = RequestId::new();
            let flow = match phase {
                CyclePhase::ResettingRoles => {
                    report.roles_reset = self.reset.run(request_id).await.unwrap_or(0);
                    ControlFlow::Continue(())
                }
                CyclePhase::MonitoringClusters => self.monitor_clusters(request_id, report).await,
                CyclePhase::MonitoringInfraEnvs => {
                    self.monitor_infra_envs(request_id, report).await
                }
            };

            if flow.is_break() {
                info!(%phase, "Lost leadership, ending host monitoring pass");
                report.lost_leadership = Some(phase);
                return;
            }
        }
    }

    /// Refresh every host of every monitored cluster.
    #[instrument(skip_all, fields(request_id = %request_id))]
    async fn monitor_clusters(
        &self,
        request_id: RequestId,
        report: &mut CycleReport,
    ) -> ControlFlow<()> {
        let mut cursor = ClusterCursor::new(self.store.as_ref(), self.config.batch_size);

        loop {
            let clusters = match cursor.next().await {
                Ok(clusters) if clusters.is_empty() => return ControlFlow::Continue(()),
                Ok(clusters) => clusters,
                Err(e) => {
                    warn!(error = %e, "Failed to fetch monitored clusters");
                    report.fetch_failures.push(CyclePhase::MonitoringClusters);
                    return ControlFlow::Continue(());
                }
            };

            for cluster in &clusters {
                let order = sort_hosts(&cluster.hosts);
                debug!(
                    cluster_id = %cluster.id,
                    cluster_status = %cluster.status,
                    hosts = order.len(),
                    all_have_inventory = order.all_have_inventory,
                    "Monitoring cluster"
                );
                report.clusters_visited += 1;

                let mut cache = InventoryCache::new();
                let scope = HostScope::Cluster(cluster);
                for host in order.hosts {
                    self.driver
                        .refresh_host(
                            request_id,
                            host,
                            scope,
                            &mut cache,
                            order.all_have_inventory,
                            report,
                        )
                        .await?;
                }
            }
        }
    }

    /// Refresh the unbound hosts of every live infra-env.
    #[instrument(skip_all, fields(request_id = %request_id))]
    async fn monitor_infra_envs(
        &self,
        request_id: RequestId,
        report: &mut CycleReport,
    ) -> ControlFlow<()> {
        let mut cursor = InfraEnvCursor::new(self.store.as_ref(), self.config.batch_size);

        loop {
            let infra_envs = match cursor.next().await {
                Ok(infra_envs) if infra_envs.is_empty() => return ControlFlow::Continue(()),
                Ok(infra_envs) => infra_envs,
                Err(e) => {
                    warn!(error = %e, "Failed to fetch infra-envs");
                    report.fetch_failures.push(CyclePhase::MonitoringInfraEnvs);
                    return ControlFlow::Continue(());
                }
            };

            for infra_env in &infra_envs {
                debug!(
                    infra_env_id = %infra_env.id,
                    hosts = infra_env.hosts.len(),
                    "Monitoring infra-env"
                );
                report.infra_envs_visited += 1;

                let mut cache = InventoryCache::new();
                let scope = HostScope::InfraEnv(infra_env);
                for host in infra_env
                    .hosts
                    .iter()
                    .filter(|host| infra_env_host_is_monitored(host))
                {
                    self.driver
                        .refresh_host(request_id, host, scope, &mut cache, false, report)
                        .await?;
                }
            }
        }
    }
}
