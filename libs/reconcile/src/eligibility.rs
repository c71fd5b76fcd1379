//! Which aggregates a monitoring pass visits, and which hosts an auto-assign
//! reset touches.
//!
//! The Postgres store expresses the same conditions in SQL using the status
//! lists below; the in-memory store calls these functions directly. The two
//! must stay in agreement.

use crate::model::{Cluster, ClusterStatus, Host, HostKind, HostRole, HostStatus};

/// Host statuses that always keep a cluster under monitoring.
pub const MONITORED_HOST_STATUSES: &[&str] = &[
    "discovering",
    "known",
    "disconnected",
    "insufficient",
    "pending-for-input",
    "preparing-for-installation",
    "preparing-failed",
    "preparing-successful",
    "installing",
    "installing-in-progress",
    "installing-pending-user-action",
    "resetting-pending-user-action",
];

/// Host statuses monitored only until log collection has finished.
pub const MONITORED_UNTIL_LOGS_COLLECTED: &[&str] = &["cancelled", "error"];

/// Log-collection states after which nothing more will be collected.
pub const TERMINAL_LOGS_STATES: &[&str] = &["completed", "timeout", ""];

/// Statuses of hosts not yet bound to a cluster that are refreshed through
/// their infra-env.
pub const MONITORED_UNBOUND_HOST_STATUSES: &[&str] = &[
    "binding",
    "disconnected-unbound",
    "discovering-unbound",
    "insufficient-unbound",
    "known-unbound",
    "reclaiming",
    "reclaiming-rebooting",
];

/// Statuses of hosts that are not reporting and are left out of role resets.
pub const INACTIVE_HOST_STATUSES: &[&str] = &["disconnected", "disabled"];

fn status_in(status: &HostStatus, set: &[&str]) -> bool {
    !matches!(status, HostStatus::Other(_)) && set.contains(&status.as_str())
}

/// Returns true if this host alone makes its cluster worth a monitoring pass.
///
/// An installed host keeps its cluster monitored until the cluster itself is
/// installed, so the tail end of an installation is still observed.
// TODO: confirm with product whether mixed installed/not-installed clusters
// should stay monitored indefinitely when the cluster never reaches installed.
pub fn host_keeps_cluster_monitored(host: &Host, cluster_status: &ClusterStatus) -> bool {
    if host.is_deleted() {
        return false;
    }

    status_in(&host.status, MONITORED_HOST_STATUSES)
        || (status_in(&host.status, MONITORED_UNTIL_LOGS_COLLECTED)
            && !host.logs_state().is_terminal())
        || (host.status == HostStatus::Installed && !cluster_status.is_installed())
}

/// Returns true if the cluster belongs in the monitoring cursor.
pub fn cluster_is_monitored(cluster: &Cluster) -> bool {
    !cluster.is_deleted()
        && cluster
            .hosts
            .iter()
            .any(|host| host_keeps_cluster_monitored(host, &cluster.status))
}

/// Returns true if an unbound host should be refreshed via its infra-env.
pub fn infra_env_host_is_monitored(host: &Host) -> bool {
    !host.is_deleted() && status_in(&host.status, MONITORED_UNBOUND_HOST_STATUSES)
}

fn reset_candidate(host: &Host) -> bool {
    !host.is_deleted()
        && host.role == HostRole::AutoAssign
        && host.kind != HostKind::AddToExistingClusterHost
        && !host.is_inactive()
}

/// Returns true if the host is auto-assigned but has no concrete suggestion,
/// which marks its whole cluster for a role reset.
pub fn host_lacks_role_suggestion(host: &Host) -> bool {
    reset_candidate(host)
        && matches!(host.suggested_role, None | Some(HostRole::AutoAssign))
}

/// Returns true if a role reset of the host's cluster rewrites this host's
/// suggestion.
pub fn host_role_is_resettable(host: &Host) -> bool {
    reset_candidate(host) && host.suggested_role != Some(HostRole::AutoAssign)
}

/// Returns true if the cluster has at least one auto-assigned host without
/// a suggestion and so needs its suggestions recomputed from scratch.
pub fn cluster_needs_role_reset(cluster: &Cluster) -> bool {
    !cluster.is_deleted() && cluster.hosts.iter().any(host_lacks_role_suggestion)
}
