//! Host monitoring primitives.
//!
//! This library holds the store-independent half of the host monitor:
//!
//! - **Model**: clusters, infra-envs and the hosts they own, with the status,
//!   role and kind vocabularies stored by the service.
//! - **Eligibility**: the named predicates deciding which aggregates a
//!   monitoring pass visits and which hosts an auto-assign reset touches.
//! - **Ordering**: the host weight formula and the stable readiness sort
//!   that gates automatic role assignment.
//! - **Inventory**: parsing of the hardware inventory and the per-group
//!   memoization cache handed to status refreshers.
//!
//! # Invariants
//!
//! - Nothing here performs I/O; every function is deterministic in its inputs
//! - A host whose inventory cannot be parsed is treated as having none
//! - Soft-deleted aggregates and hosts are never eligible for anything

pub mod eligibility;
pub mod inventory;
pub mod model;
pub mod weight;

pub use eligibility::{
    cluster_is_monitored, cluster_needs_role_reset, host_keeps_cluster_monitored,
    host_lacks_role_suggestion, host_role_is_resettable, infra_env_host_is_monitored,
};
pub use inventory::{Inventory, InventoryCache, InventoryError};
pub use model::{
    Cluster, ClusterStatus, Host, HostKind, HostRole, HostStatus, InfraEnv, LogsState,
};
pub use weight::{host_weight, sort_hosts, HostOrder};

use std::time::Duration;

/// Default interval between monitoring passes.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(8);

/// Default number of aggregates fetched per cursor page.
pub const DEFAULT_MONITOR_BATCH_SIZE: u32 = 100;
