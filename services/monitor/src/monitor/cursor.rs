//! Keyset batch cursors over monitored clusters and live infra-envs.
//!
//! A cursor remembers the raw key of the last row the store returned and
//! asks for keys strictly greater than it, so rows inserted or removed behind
//! the cursor cannot shift later pages. Once a page comes back short the
//! cursor is exhausted and every further call yields an empty batch without
//! touching the store.

use fleetmon_reconcile::{Cluster, InfraEnv};

use crate::store::{MonitorStore, Page, StoreResult};

#[derive(Debug)]
struct CursorState {
    after: Option<String>,
    batch_size: u32,
    exhausted: bool,
}

impl CursorState {
    fn new(batch_size: u32) -> Self {
        Self {
            after: None,
            batch_size: batch_size.max(1),
            exhausted: false,
        }
    }

    /// Record the outcome of a page fetch and hand the page's items on.
    ///
    /// A failed fetch ends the cursor: the error is surfaced once, and the
    /// next pass starts a fresh cursor. Rows the store skipped still count
    /// towards the page size and still move the key.
    fn advance<T>(&mut self, fetched: StoreResult<Page<T>>) -> StoreResult<Vec<T>> {
        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        match page.last_key {
            Some(last) => self.after = Some(last),
            None => self.exhausted = true,
        }
        if page.scanned < self.batch_size as usize {
            self.exhausted = true;
        }
        Ok(page.items)
    }
}

/// Pages through clusters that still have a host worth monitoring.
pub struct ClusterCursor<'a> {
    store: &'a dyn MonitorStore,
    state: CursorState,
}

impl<'a> ClusterCursor<'a> {
    pub fn new(store: &'a dyn MonitorStore, batch_size: u32) -> Self {
        Self {
            store,
            state: CursorState::new(batch_size),
        }
    }

    /// Next batch of clusters; empty once the scan is complete.
    pub async fn next(&mut self) -> StoreResult<Vec<Cluster>> {
        while !self.state.exhausted {
            let fetched = self
                .store
                .monitored_clusters_after(self.state.after.as_deref(), self.state.batch_size)
                .await;
            let batch = self.state.advance(fetched)?;
            if !batch.is_empty() {
                return Ok(batch);
            }
        }
        Ok(Vec::new())
    }
}

/// Pages through live infra-envs.
pub struct InfraEnvCursor<'a> {
    store: &'a dyn MonitorStore,
    state: CursorState,
}

impl<'a> InfraEnvCursor<'a> {
    pub fn new(store: &'a dyn MonitorStore, batch_size: u32) -> Self {
        Self {
            store,
            state: CursorState::new(batch_size),
        }
    }

    /// Next batch of infra-envs; empty once the scan is complete.
    pub async fn next(&mut self) -> StoreResult<Vec<InfraEnv>> {
        while !self.state.exhausted {
            let fetched = self
                .store
                .infra_envs_after(self.state.after.as_deref(), self.state.batch_size)
                .await;
            let batch = self.state.advance(fetched)?;
            if !batch.is_empty() {
                return Ok(batch);
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use fleetmon_id::{ClusterId, HostId, InfraEnvId};
    use fleetmon_reconcile::{ClusterStatus, Host, HostStatus};
    use std::collections::BTreeSet;

    fn cluster_with_known_host() -> Cluster {
        Cluster {
            id: ClusterId::new(),
            status: ClusterStatus::Ready,
            deleted_at: None,
            hosts: vec![Host::new(HostId::new(), HostStatus::Known)],
        }
    }

    fn store_with_clusters(count: usize) -> (MemoryStore, Vec<Cluster>) {
        let store = MemoryStore::new();
        let mut clusters: Vec<Cluster> =
            (0..count).map(|_| cluster_with_known_host()).collect();
        clusters.sort_by_key(|c| c.id);
        for cluster in &clusters {
            store.insert_cluster(cluster.clone()).unwrap();
        }
        (store, clusters)
    }

    #[tokio::test]
    async fn test_cursor_returns_each_cluster_once() {
        let (store, clusters) = store_with_clusters(7);
        let ids: Vec<ClusterId> = clusters.iter().map(|c| c.id).collect();
        let mut cursor = ClusterCursor::new(&store, 3);

        let mut seen = Vec::new();
        let mut sizes = Vec::new();
        loop {
            let batch = cursor.next().await.unwrap();
            if batch.is_empty() {
                break;
            }
            sizes.push(batch.len());
            seen.extend(batch.into_iter().map(|c| c.id));
        }

        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(seen, ids);
        assert_eq!(seen.iter().collect::<BTreeSet<_>>().len(), 7);
        // The short third page ends the scan without a fourth query.
        assert_eq!(store.fetch_count().unwrap(), 3);
        assert!(cursor.next().await.unwrap().is_empty());
        assert_eq!(store.fetch_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_with_empty_page() {
        let (store, _) = store_with_clusters(4);
        let mut cursor = ClusterCursor::new(&store, 2);

        assert_eq!(cursor.next().await.unwrap().len(), 2);
        assert_eq!(cursor.next().await.unwrap().len(), 2);
        assert!(cursor.next().await.unwrap().is_empty());
        assert_eq!(store.fetch_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cluster_finishing_between_pages_is_not_revisited() {
        let (store, clusters) = store_with_clusters(4);
        let mut cursor = ClusterCursor::new(&store, 2);

        let first = cursor.next().await.unwrap();
        assert_eq!(
            first.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![clusters[0].id, clusters[1].id]
        );

        // The next unseen cluster finishes installing before the second page.
        let finished = &clusters[2];
        store
            .set_cluster_status(finished.id, ClusterStatus::Installed)
            .unwrap();
        let mut host = finished.hosts[0].clone();
        host.cluster_id = Some(finished.id);
        host.status = HostStatus::Installed;
        store.upsert_host(host).unwrap();

        let second = cursor.next().await.unwrap();
        assert_eq!(
            second.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![clusters[3].id]
        );
        assert!(cursor.next().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_is_surfaced_once() {
        let (store, _) = store_with_clusters(3);
        store.fail_next_fetches(1).unwrap();
        let mut cursor = ClusterCursor::new(&store, 2);

        assert!(cursor.next().await.is_err());
        assert!(cursor.next().await.unwrap().is_empty());
        assert_eq!(store.fetch_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_infra_env_cursor_skips_deleted() {
        let store = MemoryStore::new();
        let live = InfraEnv {
            id: InfraEnvId::new(),
            deleted_at: None,
            hosts: vec![],
        };
        let deleted = InfraEnv {
            id: InfraEnvId::new(),
            deleted_at: Some(chrono::Utc::now()),
            hosts: vec![],
        };
        store.insert_infra_env(live.clone()).unwrap();
        store.insert_infra_env(deleted).unwrap();

        let mut cursor = InfraEnvCursor::new(&store, 10);
        let batch = cursor.next().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, live.id);
        assert!(cursor.next().await.unwrap().is_empty());
    }

    #[test]
    fn test_skipped_rows_still_move_the_key() {
        let mut state = CursorState::new(2);
        let page: Page<Cluster> = Page {
            items: Vec::new(),
            last_key: Some("cl_legacy".to_string()),
            scanned: 2,
        };

        assert!(state.advance(Ok(page)).unwrap().is_empty());
        assert_eq!(state.after.as_deref(), Some("cl_legacy"));
        assert!(!state.exhausted);

        assert!(state.advance(Ok(Page::<Cluster>::empty())).unwrap().is_empty());
        assert!(state.exhausted);
    }
}
