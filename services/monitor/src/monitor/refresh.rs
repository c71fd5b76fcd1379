//! Per-host refresh driver and the refresher interfaces it calls.
//!
//! The state machines that decide a host's next status and its suggested
//! role live outside this crate. The driver only decides when they run:
//! one host at a time, in the order it is given, with the leader gate
//! checked right before every call.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use fleetmon_id::{HostId, RequestId};
use fleetmon_reconcile::{host_weight, Cluster, Host, InfraEnv, InventoryCache};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::DbError;
use crate::leader::LeaderElector;
use crate::metrics::{MetricsReporter, OP_MONITORED_HOST};

use super::CycleReport;

/// The aggregate a host is refreshed through.
#[derive(Debug, Clone, Copy)]
pub enum HostScope<'a> {
    Cluster(&'a Cluster),
    InfraEnv(&'a InfraEnv),
}

impl HostScope<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cluster(_) => "cluster",
            Self::InfraEnv(_) => "infra_env",
        }
    }

    pub fn id(&self) -> String {
        match self {
            Self::Cluster(cluster) => cluster.id.to_string(),
            Self::InfraEnv(infra_env) => infra_env.id.to_string(),
        }
    }
}

/// Errors returned by refreshers.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] DbError),

    #[error("host {host_id} rejected refresh: {reason}")]
    Rejected { host_id: HostId, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Advances a host's status state machine by one step.
#[async_trait]
pub trait StatusRefresher: Send + Sync {
    /// `cache` is shared by every host of the same scope during one pass.
    async fn refresh_status(
        &self,
        request_id: RequestId,
        host: &Host,
        scope: HostScope<'_>,
        cache: &mut InventoryCache,
    ) -> Result<(), RefreshError>;
}

/// Recomputes a host's suggested role.
#[async_trait]
pub trait RoleRefresher: Send + Sync {
    async fn refresh_role(
        &self,
        request_id: RequestId,
        host: &Host,
        force: bool,
    ) -> Result<(), RefreshError>;
}

/// Refresher that only logs what it would do.
///
/// Lets the binary run every monitoring pass end to end against a real
/// database without owning the host state machines.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRefresher;

#[async_trait]
impl StatusRefresher for DryRunRefresher {
    async fn refresh_status(
        &self,
        request_id: RequestId,
        host: &Host,
        scope: HostScope<'_>,
        cache: &mut InventoryCache,
    ) -> Result<(), RefreshError> {
        let weight = cache.get(host).map(host_weight);
        info!(
            request_id = %request_id,
            host_id = %host.id,
            status = %host.status,
            scope = scope.kind(),
            scope_id = %scope.id(),
            weight,
            "Dry run: would refresh host status"
        );
        Ok(())
    }
}

#[async_trait]
impl RoleRefresher for DryRunRefresher {
    async fn refresh_role(
        &self,
        request_id: RequestId,
        host: &Host,
        force: bool,
    ) -> Result<(), RefreshError> {
        info!(
            request_id = %request_id,
            host_id = %host.id,
            role = %host.role,
            force,
            "Dry run: would refresh host role"
        );
        Ok(())
    }
}

/// Runs the refreshers for one host at a time.
#[derive(Clone)]
pub struct RefreshDriver {
    leader: Arc<dyn LeaderElector>,
    status: Arc<dyn StatusRefresher>,
    role: Arc<dyn RoleRefresher>,
    metrics: Arc<dyn MetricsReporter>,
}

impl RefreshDriver {
    pub fn new(
        leader: Arc<dyn LeaderElector>,
        status: Arc<dyn StatusRefresher>,
        role: Arc<dyn RoleRefresher>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        Self {
            leader,
            status,
            role,
            metrics,
        }
    }

    /// Refresh one host.
    ///
    /// Refresher failures are logged and counted, never returned. Breaks
    /// when leadership is found lost before either refresher call.
    pub async fn refresh_host(
        &self,
        request_id: RequestId,
        host: &Host,
        scope: HostScope<'_>,
        cache: &mut InventoryCache,
        refresh_role: bool,
        report: &mut CycleReport,
    ) -> ControlFlow<()> {
        if !self.leader.is_leader() {
            debug!(
                request_id = %request_id,
                host_id = %host.id,
                "Not a leader, stopping host refresh"
            );
            return ControlFlow::Break(());
        }

        let started = Instant::now();
        let refreshed = self
            .status
            .refresh_status(request_id, host, scope, cache)
            .await;
        self.metrics
            .report_duration(OP_MONITORED_HOST, started.elapsed().as_secs_f64() * 1000.0);

        match refreshed {
            Ok(()) => report.hosts_refreshed += 1,
            Err(e) => {
                warn!(
                    request_id = %request_id,
                    host_id = %host.id,
                    scope = scope.kind(),
                    scope_id = %scope.id(),
                    error = %e,
                    "Failed to refresh host status"
                );
                report.hosts_failed += 1;
            }
        }

        if !refresh_role {
            return ControlFlow::Continue(());
        }

        if !self.leader.is_leader() {
            debug!(
                request_id = %request_id,
                host_id = %host.id,
                "Not a leader, skipping role refresh"
            );
            return ControlFlow::Break(());
        }

        match self.role.refresh_role(request_id, host, false).await {
            Ok(()) => report.roles_refreshed += 1,
            Err(e) => {
                warn!(
                    request_id = %request_id,
                    host_id = %host.id,
                    error = %e,
                    "Failed to refresh host role"
                );
                report.roles_failed += 1;
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use fleetmon_id::ClusterId;
    use fleetmon_reconcile::{ClusterStatus, HostStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Leads for the first `leads` checks.
    struct Countdown {
        leads: AtomicU32,
    }

    impl LeaderElector for Countdown {
        fn is_leader(&self) -> bool {
            self.leads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[derive(Default)]
    struct Counting {
        status: AtomicU32,
        role: AtomicU32,
    }

    #[async_trait]
    impl StatusRefresher for Counting {
        async fn refresh_status(
            &self,
            _request_id: RequestId,
            _host: &Host,
            _scope: HostScope<'_>,
            _cache: &mut InventoryCache,
        ) -> Result<(), RefreshError> {
            self.status.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl RoleRefresher for Counting {
        async fn refresh_role(
            &self,
            _request_id: RequestId,
            _host: &Host,
            _force: bool,
        ) -> Result<(), RefreshError> {
            self.role.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn drive(leads: u32) -> (ControlFlow<()>, Arc<Counting>, CycleReport) {
        let counting = Arc::new(Counting::default());
        let driver = RefreshDriver::new(
            Arc::new(Countdown {
                leads: AtomicU32::new(leads),
            }),
            counting.clone(),
            counting.clone(),
            Arc::new(NoopMetrics),
        );
        let host = Host::new(HostId::new(), HostStatus::Known);
        let cluster = Cluster {
            id: ClusterId::new(),
            status: ClusterStatus::Ready,
            deleted_at: None,
            hosts: vec![host.clone()],
        };
        let mut report = CycleReport::default();
        let flow = driver
            .refresh_host(
                RequestId::new(),
                &host,
                HostScope::Cluster(&cluster),
                &mut InventoryCache::new(),
                true,
                &mut report,
            )
            .await;
        (flow, counting, report)
    }

    #[tokio::test]
    async fn test_follower_calls_nothing() {
        let (flow, counting, report) = drive(0).await;
        assert!(flow.is_break());
        assert_eq!(counting.status.load(Ordering::SeqCst), 0);
        assert_eq!(counting.role.load(Ordering::SeqCst), 0);
        assert_eq!(report, CycleReport::default());
    }

    #[tokio::test]
    async fn test_leadership_lost_before_role_refresh() {
        let (flow, counting, report) = drive(1).await;
        assert!(flow.is_break());
        assert_eq!(counting.status.load(Ordering::SeqCst), 1);
        assert_eq!(counting.role.load(Ordering::SeqCst), 0);
        assert_eq!(report.hosts_refreshed, 1);
    }

    #[tokio::test]
    async fn test_leader_refreshes_status_then_role() {
        let (flow, counting, report) = drive(2).await;
        assert!(flow.is_continue());
        assert_eq!(counting.status.load(Ordering::SeqCst), 1);
        assert_eq!(counting.role.load(Ordering::SeqCst), 1);
        assert_eq!(report.roles_refreshed, 1);
    }

    #[test]
    fn test_scope_labels() {
        let infra_env = InfraEnv {
            id: fleetmon_id::InfraEnvId::new(),
            deleted_at: None,
            hosts: vec![],
        };
        let scope = HostScope::InfraEnv(&infra_env);
        assert_eq!(scope.kind(), "infra_env");
        assert_eq!(scope.id(), infra_env.id.to_string());
    }
}
