//! In-memory implementation of [`MonitorStore`].
//!
//! Evaluates the eligibility predicates directly instead of through SQL.
//! Backs the monitor's unit and integration tests, with fault injection and
//! counters for asserting how many pages and resets were run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use fleetmon_id::{ClusterId, HostId, InfraEnvId};
use fleetmon_reconcile::{
    cluster_is_monitored, cluster_needs_role_reset, host_role_is_resettable, Cluster,
    ClusterStatus, Host, HostRole, InfraEnv,
};

use super::{MonitorStore, Page, StoreResult};
use crate::db::DbError;

#[derive(Debug, Clone)]
struct ClusterRecord {
    status: ClusterStatus,
    deleted_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct InfraEnvRecord {
    deleted_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    clusters: BTreeMap<ClusterId, ClusterRecord>,
    infra_envs: BTreeMap<InfraEnvId, InfraEnvRecord>,
    hosts: BTreeMap<HostId, Host>,
    failing_fetches: u32,
    fetches: u32,
    resets: u32,
}

impl State {
    fn cluster(&self, id: ClusterId, record: &ClusterRecord) -> Cluster {
        Cluster {
            id,
            status: record.status.clone(),
            deleted_at: record.deleted_at,
            hosts: self
                .hosts
                .values()
                .filter(|h| h.cluster_id == Some(id) && !h.is_deleted())
                .cloned()
                .collect(),
        }
    }

    fn infra_env(&self, id: InfraEnvId, record: &InfraEnvRecord) -> InfraEnv {
        InfraEnv {
            id,
            deleted_at: record.deleted_at,
            hosts: self
                .hosts
                .values()
                .filter(|h| h.infra_env_id == Some(id) && !h.is_deleted())
                .cloned()
                .collect(),
        }
    }

    fn take_fetch_failure(&mut self) -> StoreResult<()> {
        self.fetches += 1;
        if self.failing_fetches > 0 {
            self.failing_fetches -= 1;
            return Err(DbError::Unavailable("injected fetch failure".to_string()));
        }
        Ok(())
    }
}

/// Monitor store holding clusters, infra-envs and hosts in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| DbError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Insert or replace a cluster and its hosts.
    pub fn insert_cluster(&self, cluster: Cluster) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.clusters.insert(
            cluster.id,
            ClusterRecord {
                status: cluster.status,
                deleted_at: cluster.deleted_at,
            },
        );
        for mut host in cluster.hosts {
            host.cluster_id = Some(cluster.id);
            state.hosts.insert(host.id, host);
        }
        Ok(())
    }

    /// Insert or replace an infra-env and its hosts.
    pub fn insert_infra_env(&self, infra_env: InfraEnv) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.infra_envs.insert(
            infra_env.id,
            InfraEnvRecord {
                deleted_at: infra_env.deleted_at,
            },
        );
        for mut host in infra_env.hosts {
            host.infra_env_id = Some(infra_env.id);
            state.hosts.insert(host.id, host);
        }
        Ok(())
    }

    /// Insert or replace a single host.
    pub fn upsert_host(&self, host: Host) -> StoreResult<()> {
        self.lock()?.hosts.insert(host.id, host);
        Ok(())
    }

    /// Current copy of a host.
    pub fn host(&self, id: HostId) -> StoreResult<Option<Host>> {
        Ok(self.lock()?.hosts.get(&id).cloned())
    }

    /// Change a cluster's status. Returns false if the cluster is unknown.
    pub fn set_cluster_status(&self, id: ClusterId, status: ClusterStatus) -> StoreResult<bool> {
        let mut state = self.lock()?;
        Ok(match state.clusters.get_mut(&id) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        })
    }

    /// Soft-delete a cluster. Returns false if the cluster is unknown.
    pub fn delete_cluster(&self, id: ClusterId) -> StoreResult<bool> {
        let mut state = self.lock()?;
        Ok(match state.clusters.get_mut(&id) {
            Some(record) => {
                record.deleted_at = Some(Utc::now());
                true
            }
            None => false,
        })
    }

    /// Make the next `count` page fetches fail.
    pub fn fail_next_fetches(&self, count: u32) -> StoreResult<()> {
        self.lock()?.failing_fetches = count;
        Ok(())
    }

    /// Number of page fetches attempted so far, failed ones included.
    pub fn fetch_count(&self) -> StoreResult<u32> {
        Ok(self.lock()?.fetches)
    }

    /// Number of role resets executed so far.
    pub fn reset_count(&self) -> StoreResult<u32> {
        Ok(self.lock()?.resets)
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn monitored_clusters_after(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> StoreResult<Page<Cluster>> {
        let mut state = self.lock()?;
        state.take_fetch_failure()?;

        let items: Vec<Cluster> = state
            .clusters
            .iter()
            .filter(|(id, _)| is_after(&id.to_string(), after))
            .map(|(id, record)| state.cluster(*id, record))
            .filter(cluster_is_monitored)
            .take(limit as usize)
            .collect();
        Ok(page_of(items, |cluster| cluster.id.to_string()))
    }

    async fn infra_envs_after(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> StoreResult<Page<InfraEnv>> {
        let mut state = self.lock()?;
        state.take_fetch_failure()?;

        let items: Vec<InfraEnv> = state
            .infra_envs
            .iter()
            .filter(|(id, record)| record.deleted_at.is_none() && is_after(&id.to_string(), after))
            .map(|(id, record)| state.infra_env(*id, record))
            .take(limit as usize)
            .collect();
        Ok(page_of(items, |infra_env| infra_env.id.to_string()))
    }

    async fn reset_auto_assign_roles(&self) -> StoreResult<u64> {
        let mut state = self.lock()?;
        state.resets += 1;

        let targets: BTreeSet<ClusterId> = state
            .clusters
            .iter()
            .map(|(id, record)| state.cluster(*id, record))
            .filter(cluster_needs_role_reset)
            .map(|cluster| cluster.id)
            .collect();

        let mut count = 0;
        for host in state.hosts.values_mut() {
            let in_target = host.cluster_id.is_some_and(|id| targets.contains(&id));
            if in_target && host_role_is_resettable(host) {
                host.suggested_role = Some(HostRole::AutoAssign);
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Keyset comparison on the rendered ID, matching the byte order of the SQL.
fn is_after(key: &str, after: Option<&str>) -> bool {
    after.map_or(true, |after| key > after)
}

fn page_of<T>(items: Vec<T>, key: impl Fn(&T) -> String) -> Page<T> {
    Page {
        last_key: items.last().map(key),
        scanned: items.len(),
        items,
    }
}
