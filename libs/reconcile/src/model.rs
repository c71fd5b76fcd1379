//! Clusters, infra-envs and hosts as the monitor sees them.
//!
//! Status, role and kind columns are free-form strings in the store. Each is
//! mapped onto an enum of the values the monitor reasons about, and anything
//! else is kept verbatim in an `Other` variant so it can be logged and handed
//! back to refreshers unchanged.

use chrono::{DateTime, Utc};
use fleetmon_id::{ClusterId, HostId, InfraEnvId};

use crate::inventory::{Inventory, InventoryError};

/// Generates a string-backed enum with a catch-all `Other` variant.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// A value this service does not recognise.
            Other(String),
        }

        impl $name {
            /// Returns the stored string form.
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Other(raw) => raw.as_str(),
                }
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                match raw {
                    $($wire => Self::$variant,)+
                    other => Self::Other(other.to_string()),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Ok(Self::from(raw.as_str()))
            }
        }
    };
}

string_enum! {
    /// Host lifecycle status.
    pub enum HostStatus {
        Discovering => "discovering",
        Known => "known",
        Disconnected => "disconnected",
        Insufficient => "insufficient",
        Disabled => "disabled",
        PreparingForInstallation => "preparing-for-installation",
        PreparingFailed => "preparing-failed",
        PreparingSuccessful => "preparing-successful",
        PendingForInput => "pending-for-input",
        Installing => "installing",
        InstallingInProgress => "installing-in-progress",
        InstallingPendingUserAction => "installing-pending-user-action",
        Resetting => "resetting",
        ResettingPendingUserAction => "resetting-pending-user-action",
        Installed => "installed",
        Error => "error",
        Cancelled => "cancelled",
        AddedToExistingCluster => "added-to-existing-cluster",
        Binding => "binding",
        Unbinding => "unbinding",
        UnbindingPendingUserAction => "unbinding-pending-user-action",
        KnownUnbound => "known-unbound",
        DisconnectedUnbound => "disconnected-unbound",
        InsufficientUnbound => "insufficient-unbound",
        DisabledUnbound => "disabled-unbound",
        DiscoveringUnbound => "discovering-unbound",
        Reclaiming => "reclaiming",
        ReclaimingRebooting => "reclaiming-rebooting",
    }
}

string_enum! {
    /// Cluster lifecycle status.
    pub enum ClusterStatus {
        Insufficient => "insufficient",
        Ready => "ready",
        Error => "error",
        PreparingForInstallation => "preparing-for-installation",
        PendingForInput => "pending-for-input",
        Installing => "installing",
        Finalizing => "finalizing",
        Installed => "installed",
        AddingHosts => "adding-hosts",
        Cancelled => "cancelled",
        InstallingPendingUserAction => "installing-pending-user-action",
    }
}

string_enum! {
    /// Host role, either operator-chosen or left to the system.
    pub enum HostRole {
        /// The system picks the role and records it as a suggestion.
        AutoAssign => "auto-assign",
        Master => "master",
        Worker => "worker",
        Arbiter => "arbiter",
    }
}

string_enum! {
    /// Whether a host is part of a new installation or joins an existing one.
    pub enum HostKind {
        Host => "Host",
        AddToExistingClusterHost => "AddToExistingClusterHost",
    }
}

string_enum! {
    /// Progress of log collection from a host.
    pub enum LogsState {
        Requested => "requested",
        Collecting => "collecting",
        Completed => "completed",
        Timeout => "timeout",
        Empty => "",
    }
}

impl HostRole {
    /// Parses an optional column value; an empty string means "unset".
    pub fn from_optional(raw: Option<&str>) -> Option<Self> {
        raw.filter(|s| !s.is_empty()).map(Self::from)
    }
}

impl LogsState {
    /// Returns true once no further log collection will happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Timeout | Self::Empty)
    }
}

impl ClusterStatus {
    /// Returns true if the cluster has finished installing.
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed)
    }
}

/// A host, bound to a cluster or waiting in an infra-env.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub id: HostId,
    pub cluster_id: Option<ClusterId>,
    pub infra_env_id: Option<InfraEnvId>,
    pub status: HostStatus,
    pub role: HostRole,
    pub suggested_role: Option<HostRole>,
    pub kind: HostKind,
    /// Serialized hardware inventory as reported by the host agent.
    pub inventory: Option<String>,
    pub logs_info: Option<LogsState>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Host {
    /// Creates a live, cluster-less host with no inventory and an
    /// auto-assigned role.
    pub fn new(id: HostId, status: HostStatus) -> Self {
        Self {
            id,
            cluster_id: None,
            infra_env_id: None,
            status,
            role: HostRole::AutoAssign,
            suggested_role: None,
            kind: HostKind::Host,
            inventory: None,
            logs_info: None,
            deleted_at: None,
        }
    }

    /// Parses the stored inventory.
    pub fn parse_inventory(&self) -> Result<Inventory, InventoryError> {
        Inventory::parse(self.inventory.as_deref().unwrap_or_default())
    }

    /// Returns true if the host has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns true for statuses in which a host no longer reports in.
    pub fn is_inactive(&self) -> bool {
        matches!(self.status, HostStatus::Disconnected | HostStatus::Disabled)
    }

    /// Log-collection state, with an unset column read as empty.
    pub fn logs_state(&self) -> LogsState {
        self.logs_info.clone().unwrap_or(LogsState::Empty)
    }
}

/// A provisioning cluster with its hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    pub status: ClusterStatus,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Live hosts, ordered by ID.
    pub hosts: Vec<Host>,
}

impl Cluster {
    /// Returns true if the cluster has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// An infra-env with the hosts discovered through it.
#[derive(Debug, Clone, PartialEq)]
pub struct InfraEnv {
    pub id: InfraEnvId,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Live hosts, ordered by ID.
    pub hosts: Vec<Host>,
}

impl InfraEnv {
    /// Returns true if the infra-env has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("installing-in-progress", HostStatus::InstallingInProgress)]
    #[case("known-unbound", HostStatus::KnownUnbound)]
    #[case("reclaiming-rebooting", HostStatus::ReclaimingRebooting)]
    fn test_host_status_wire_names(#[case] raw: &str, #[case] status: HostStatus) {
        assert_eq!(HostStatus::from(raw), status);
        assert_eq!(status.as_str(), raw);
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status = HostStatus::from("rebooting-into-space");
        assert_eq!(status, HostStatus::Other("rebooting-into-space".to_string()));
        assert_eq!(status.to_string(), "rebooting-into-space");
    }

    #[test]
    fn test_empty_suggested_role_is_unset() {
        assert_eq!(HostRole::from_optional(Some("")), None);
        assert_eq!(HostRole::from_optional(None), None);
        assert_eq!(
            HostRole::from_optional(Some("worker")),
            Some(HostRole::Worker)
        );
    }

    #[test]
    fn test_logs_state_terminal() {
        assert!(LogsState::Completed.is_terminal());
        assert!(LogsState::Timeout.is_terminal());
        assert!(LogsState::Empty.is_terminal());
        assert!(!LogsState::Collecting.is_terminal());
        assert!(!LogsState::Requested.is_terminal());
    }

    #[test]
    fn test_missing_logs_info_reads_as_empty() {
        let host = Host::new(HostId::new(), HostStatus::Error);
        assert_eq!(host.logs_state(), LogsState::Empty);
    }

    #[test]
    fn test_status_serde_uses_wire_name() {
        let json = serde_json::to_string(&HostStatus::PreparingFailed).unwrap();
        assert_eq!(json, "\"preparing-failed\"");
        let back: HostStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, HostStatus::PreparingFailed);
    }
}
