//! Postgres implementation of [`MonitorStore`].
//!
//! Status lists are bound from [`fleetmon_reconcile::eligibility`] so the SQL
//! predicates and the in-memory ones share one vocabulary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetmon_id::{ClusterId, HostId, InfraEnvId};
use fleetmon_reconcile::eligibility::{
    INACTIVE_HOST_STATUSES, MONITORED_HOST_STATUSES, MONITORED_UNTIL_LOGS_COLLECTED,
    TERMINAL_LOGS_STATES,
};
use fleetmon_reconcile::{
    Cluster, ClusterStatus, Host, HostKind, HostRole, HostStatus, InfraEnv, LogsState,
};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, instrument, warn};

use super::{MonitorStore, Page, StoreResult};
use crate::db::DbError;

/// Monitor store backed by the service database.
#[derive(Clone)]
pub struct PgMonitorStore {
    pool: PgPool,
}

impl PgMonitorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load live hosts for a set of parents, keyed by parent ID.
    async fn hosts_by_parent(
        tx: &mut Transaction<'_, Postgres>,
        parent_column: HostParent,
        parent_ids: &[String],
    ) -> StoreResult<HashMap<String, Vec<Host>>> {
        let sql = format!(
            r#"
            SELECT id, cluster_id, infra_env_id, status, role, suggested_role,
                   kind, inventory, logs_info, deleted_at
            FROM hosts
            WHERE {column} = ANY($1) AND deleted_at IS NULL
            ORDER BY {column}, id
            "#,
            column = parent_column.as_str()
        );

        let rows = sqlx::query_as::<_, HostRow>(&sql)
            .bind(parent_ids)
            .fetch_all(&mut **tx)
            .await?;

        let mut grouped: HashMap<String, Vec<Host>> = HashMap::new();
        for row in rows {
            let parent = match parent_column {
                HostParent::Cluster => row.cluster_id.clone(),
                HostParent::InfraEnv => row.infra_env_id.clone(),
            };
            let Some(host) = skip_unmapped(Host::try_from(row)) else {
                continue;
            };
            if let Some(parent) = parent {
                grouped.entry(parent).or_default().push(host);
            }
        }
        Ok(grouped)
    }
}

#[derive(Debug, Clone, Copy)]
enum HostParent {
    Cluster,
    InfraEnv,
}

impl HostParent {
    fn as_str(self) -> &'static str {
        match self {
            Self::Cluster => "cluster_id",
            Self::InfraEnv => "infra_env_id",
        }
    }
}

#[async_trait]
impl MonitorStore for PgMonitorStore {
    #[instrument(skip(self))]
    async fn monitored_clusters_after(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> StoreResult<Page<Cluster>> {
        let mut tx = self.pool.begin().await?;

        // An installed host keeps its cluster monitored until the cluster
        // itself reports installed.
        let rows = sqlx::query_as::<_, ClusterRow>(
            r#"
            SELECT c.id, c.status, c.deleted_at
            FROM clusters c
            WHERE c.deleted_at IS NULL
              AND ($1::TEXT IS NULL OR c.id > $1)
              AND EXISTS (
                  SELECT 1 FROM hosts h
                  WHERE h.cluster_id = c.id
                    AND h.deleted_at IS NULL
                    AND (
                        h.status = ANY($2)
                        OR (h.status = ANY($3) AND COALESCE(h.logs_info, '') <> ALL($4))
                        OR (h.status = 'installed' AND c.status <> 'installed')
                    )
              )
            ORDER BY c.id
            LIMIT $5
            "#,
        )
        .bind(after)
        .bind(MONITORED_HOST_STATUSES)
        .bind(MONITORED_UNTIL_LOGS_COLLECTED)
        .bind(TERMINAL_LOGS_STATES)
        .bind(i64::from(limit))
        .fetch_all(&mut *tx)
        .await?;

        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let mut hosts = Self::hosts_by_parent(&mut tx, HostParent::Cluster, &ids).await?;
        tx.commit().await?;

        debug!(clusters = rows.len(), "Fetched monitored cluster page");

        let scanned = rows.len();
        let last_key = rows.last().map(|row| row.id.clone());
        let items = rows
            .into_iter()
            .filter_map(|row| {
                let hosts = hosts.remove(&row.id).unwrap_or_default();
                let id = skip_unmapped(parse_id("clusters", "id", &row.id))?;
                Some(Cluster {
                    id,
                    status: ClusterStatus::from(row.status.as_str()),
                    deleted_at: row.deleted_at,
                    hosts,
                })
            })
            .collect();

        Ok(Page {
            items,
            last_key,
            scanned,
        })
    }

    #[instrument(skip(self))]
    async fn infra_envs_after(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> StoreResult<Page<InfraEnv>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, InfraEnvRow>(
            r#"
            SELECT id, deleted_at
            FROM infra_envs
            WHERE deleted_at IS NULL
              AND ($1::TEXT IS NULL OR id > $1)
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(i64::from(limit))
        .fetch_all(&mut *tx)
        .await?;

        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let mut hosts = Self::hosts_by_parent(&mut tx, HostParent::InfraEnv, &ids).await?;
        tx.commit().await?;

        debug!(infra_envs = rows.len(), "Fetched infra-env page");

        let scanned = rows.len();
        let last_key = rows.last().map(|row| row.id.clone());
        let items = rows
            .into_iter()
            .filter_map(|row| {
                let hosts = hosts.remove(&row.id).unwrap_or_default();
                let id = skip_unmapped(parse_id("infra_envs", "id", &row.id))?;
                Some(InfraEnv {
                    id,
                    deleted_at: row.deleted_at,
                    hosts,
                })
            })
            .collect();

        Ok(Page {
            items,
            last_key,
            scanned,
        })
    }

    #[instrument(skip(self))]
    async fn reset_auto_assign_roles(&self) -> StoreResult<u64> {
        // One statement: the inner SELECT picks clusters with an unsuggested
        // auto-assign host, the outer UPDATE rewrites every auto-assign
        // suggestion in those clusters.
        let result = sqlx::query(
            r#"
            UPDATE hosts
            SET suggested_role = $1
            WHERE role = $1
              AND suggested_role IS DISTINCT FROM $1
              AND kind <> $2
              AND status <> ALL($3)
              AND deleted_at IS NULL
              AND cluster_id IN (
                  SELECT DISTINCT h.cluster_id
                  FROM hosts h
                  WHERE h.role = $1
                    AND (h.suggested_role = $1 OR h.suggested_role = '' OR h.suggested_role IS NULL)
                    AND h.status <> ALL($3)
                    AND h.kind <> $2
                    AND h.deleted_at IS NULL
                    AND EXISTS (
                        SELECT 1 FROM clusters c
                        WHERE c.id = h.cluster_id AND c.deleted_at IS NULL
                    )
              )
            "#,
        )
        .bind(HostRole::AutoAssign.as_str())
        .bind(HostKind::AddToExistingClusterHost.as_str())
        .bind(INACTIVE_HOST_STATUSES)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Drops a row that does not map onto the model so one bad row cannot stall
/// the scan. Its siblings are still returned.
fn skip_unmapped<T>(mapped: StoreResult<T>) -> Option<T> {
    match mapped {
        Ok(value) => Some(value),
        Err(DbError::InvalidRow {
            table,
            column,
            message,
        }) => {
            warn!(table, column, value = %message, "Skipping row that does not map onto the model");
            None
        }
        Err(e) => {
            warn!(error = %e, "Skipping row that does not map onto the model");
            None
        }
    }
}

fn parse_id<T>(table: &'static str, column: &'static str, raw: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = fleetmon_id::IdError>,
{
    raw.parse().map_err(|e: fleetmon_id::IdError| DbError::InvalidRow {
        table,
        column,
        message: format!("{raw:?}: {e}"),
    })
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug)]
struct ClusterRow {
    id: String,
    status: String,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ClusterRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

#[derive(Debug)]
struct InfraEnvRow {
    id: String,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for InfraEnvRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

#[derive(Debug)]
struct HostRow {
    id: String,
    cluster_id: Option<String>,
    infra_env_id: Option<String>,
    status: String,
    role: String,
    suggested_role: Option<String>,
    kind: String,
    inventory: Option<String>,
    logs_info: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for HostRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            cluster_id: row.try_get("cluster_id")?,
            infra_env_id: row.try_get("infra_env_id")?,
            status: row.try_get("status")?,
            role: row.try_get("role")?,
            suggested_role: row.try_get("suggested_role")?,
            kind: row.try_get("kind")?,
            inventory: row.try_get("inventory")?,
            logs_info: row.try_get("logs_info")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl TryFrom<HostRow> for Host {
    type Error = DbError;

    fn try_from(row: HostRow) -> Result<Self, Self::Error> {
        Ok(Host {
            id: parse_id::<HostId>("hosts", "id", &row.id)?,
            cluster_id: row
                .cluster_id
                .as_deref()
                .map(|raw| parse_id::<ClusterId>("hosts", "cluster_id", raw))
                .transpose()?,
            infra_env_id: row
                .infra_env_id
                .as_deref()
                .map(|raw| parse_id::<InfraEnvId>("hosts", "infra_env_id", raw))
                .transpose()?,
            status: HostStatus::from(row.status.as_str()),
            role: HostRole::from(row.role.as_str()),
            suggested_role: HostRole::from_optional(row.suggested_role.as_deref()),
            kind: HostKind::from(row.kind.as_str()),
            inventory: row.inventory,
            logs_info: row.logs_info.as_deref().map(LogsState::from),
            deleted_at: row.deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, suggested_role: Option<&str>) -> HostRow {
        HostRow {
            id: HostId::new().to_string(),
            cluster_id: Some(ClusterId::new().to_string()),
            infra_env_id: None,
            status: status.to_string(),
            role: "auto-assign".to_string(),
            suggested_role: suggested_role.map(str::to_string),
            kind: "Host".to_string(),
            inventory: None,
            logs_info: Some(String::new()),
            deleted_at: None,
        }
    }

    #[test]
    fn test_host_row_maps_onto_model() {
        let host = Host::try_from(row("installing", Some(""))).unwrap();
        assert_eq!(host.status, HostStatus::Installing);
        assert_eq!(host.role, HostRole::AutoAssign);
        assert_eq!(host.suggested_role, None);
        assert_eq!(host.kind, HostKind::Host);
        assert_eq!(host.logs_info, Some(LogsState::Empty));
        assert!(host.cluster_id.is_some());
    }

    #[test]
    fn test_unmapped_row_is_skipped() {
        let mut bad = row("known", None);
        bad.id = "host_legacy-0001".to_string();
        assert!(skip_unmapped(Host::try_from(bad)).is_none());
        assert!(skip_unmapped(Host::try_from(row("known", None))).is_some());
    }

    #[test]
    fn test_host_row_with_bad_id_is_rejected() {
        let mut bad = row("known", None);
        bad.cluster_id = Some("not-an-id".to_string());
        let err = Host::try_from(bad).unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidRow {
                table: "hosts",
                column: "cluster_id",
                ..
            }
        ));
    }
}
