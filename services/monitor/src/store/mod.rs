//! Storage access used by the host monitor.
//!
//! The monitor reads clusters and infra-envs one keyset page at a time and
//! performs exactly one write of its own: the bulk auto-assign role reset.
//! Everything else is written by the refreshers it drives.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgMonitorStore;

use async_trait::async_trait;
use fleetmon_reconcile::{Cluster, InfraEnv};

use crate::db::DbError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, DbError>;

/// One keyset page.
///
/// `last_key` and `scanned` describe the rows the query returned, including
/// rows that were dropped because they did not map onto the model, so an
/// unreadable row can neither pin the cursor nor end the scan early.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Raw ID of the last row returned by the query.
    pub last_key: Option<String>,
    /// Number of rows returned by the query.
    pub scanned: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            last_key: None,
            scanned: 0,
        }
    }
}

/// Queries and the single bulk update the monitor needs from the store.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Next page of monitored clusters with IDs strictly greater than `after`,
    /// ascending by ID, each with all of its live hosts.
    ///
    /// Keys compare as plain bytes, the order of the stored ID text.
    ///
    /// A cluster is monitored when it is not deleted and at least one live
    /// host satisfies [`fleetmon_reconcile::host_keeps_cluster_monitored`].
    async fn monitored_clusters_after(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> StoreResult<Page<Cluster>>;

    /// Next page of live infra-envs with IDs strictly greater than `after`,
    /// ascending by ID, each with all of its live hosts.
    async fn infra_envs_after(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> StoreResult<Page<InfraEnv>>;

    /// Clears the role suggestions of every cluster that has an auto-assigned
    /// host without one, as a single atomic update.
    ///
    /// Returns the number of hosts whose suggestion was rewritten.
    async fn reset_auto_assign_roles(&self) -> StoreResult<u64>;
}
