//! Host hardware inventory.
//!
//! Only the fields the monitor scores on are modelled; everything else in
//! the agent's report is ignored. Missing sections read as zero.

use std::collections::HashMap;

use fleetmon_id::HostId;
use serde::Deserialize;
use thiserror::Error;

use crate::model::Host;

const BYTES_PER_GIB: i64 = 1 << 30;

/// Why an inventory could not be read.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The host has not reported an inventory yet.
    #[error("inventory is empty")]
    Empty,

    /// The stored inventory is not valid JSON of the expected shape.
    #[error("malformed inventory: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Hardware description reported by a host.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub cpu: Option<Cpu>,
    #[serde(default)]
    pub memory: Option<Memory>,
    #[serde(default)]
    pub disks: Vec<Disk>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Cpu {
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub usable_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Disk {
    #[serde(default)]
    pub size_bytes: i64,
    #[serde(default)]
    pub installation_eligibility: InstallationEligibility,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InstallationEligibility {
    #[serde(default)]
    pub eligible: bool,
}

impl Inventory {
    /// Parses a stored inventory document.
    pub fn parse(raw: &str) -> Result<Self, InventoryError> {
        if raw.trim().is_empty() {
            return Err(InventoryError::Empty);
        }
        Ok(serde_json::from_str(raw)?)
    }

    /// Number of CPU cores, zero when unreported.
    pub fn cpu_count(&self) -> i64 {
        self.cpu.as_ref().map_or(0, |cpu| cpu.count)
    }

    /// Usable memory in whole GiB.
    pub fn usable_memory_gib(&self) -> i64 {
        self.memory
            .as_ref()
            .map_or(0, |memory| bytes_to_gib(memory.usable_bytes))
    }

    /// Capacity of installation-eligible disks in whole GiB, truncated per disk.
    pub fn eligible_disk_capacity_gib(&self) -> i64 {
        self.disks
            .iter()
            .filter(|disk| disk.installation_eligibility.eligible)
            .map(|disk| bytes_to_gib(disk.size_bytes))
            .sum()
    }
}

/// Converts bytes to whole gibibytes, truncating.
pub fn bytes_to_gib(bytes: i64) -> i64 {
    bytes / BYTES_PER_GIB
}

/// Parsed inventories for the hosts of one cluster or infra-env.
///
/// A cache is created when the monitor starts on a group and dropped when it
/// moves on, so entries never outlive the pass that produced them. Parse
/// failures are memoized too.
#[derive(Debug, Default)]
pub struct InventoryCache {
    entries: HashMap<HostId, Option<Inventory>>,
}

impl InventoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the host's inventory, parsing it on first access.
    pub fn get(&mut self, host: &Host) -> Option<&Inventory> {
        self.entries
            .entry(host.id)
            .or_insert_with(|| host.parse_inventory().ok())
            .as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HostStatus;

    const GIB: i64 = 1 << 30;

    fn inventory_json(cores: i64, mem_gib: i64, disks: &[(i64, bool)]) -> String {
        let disks: Vec<_> = disks
            .iter()
            .map(|(gib, eligible)| {
                serde_json::json!({
                    "size_bytes": gib * GIB,
                    "installation_eligibility": { "eligible": eligible },
                })
            })
            .collect();
        serde_json::json!({
            "cpu": { "count": cores, "architecture": "x86_64" },
            "memory": { "usable_bytes": mem_gib * GIB, "physical_bytes": mem_gib * GIB },
            "disks": disks,
        })
        .to_string()
    }

    #[test]
    fn test_parse_reads_scored_fields() {
        let inv = Inventory::parse(&inventory_json(8, 32, &[(200, true), (50, false)])).unwrap();
        assert_eq!(inv.cpu_count(), 8);
        assert_eq!(inv.usable_memory_gib(), 32);
        assert_eq!(inv.eligible_disk_capacity_gib(), 200);
    }

    #[test]
    fn test_missing_sections_read_as_zero() {
        let inv = Inventory::parse("{}").unwrap();
        assert_eq!(inv.cpu_count(), 0);
        assert_eq!(inv.usable_memory_gib(), 0);
        assert_eq!(inv.eligible_disk_capacity_gib(), 0);
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(Inventory::parse(""), Err(InventoryError::Empty)));
        assert!(matches!(Inventory::parse("  "), Err(InventoryError::Empty)));
        assert!(matches!(
            Inventory::parse("{not json"),
            Err(InventoryError::Malformed(_))
        ));
        assert!(matches!(
            Inventory::parse("null"),
            Err(InventoryError::Malformed(_))
        ));
    }

    #[test]
    fn test_gib_conversion_truncates_per_disk() {
        let inv = Inventory {
            disks: vec![
                Disk {
                    size_bytes: GIB + GIB / 2,
                    installation_eligibility: InstallationEligibility { eligible: true },
                },
                Disk {
                    size_bytes: GIB + GIB / 2,
                    installation_eligibility: InstallationEligibility { eligible: true },
                },
            ],
            ..Default::default()
        };
        assert_eq!(inv.eligible_disk_capacity_gib(), 2);
    }

    #[test]
    fn test_cache_memoizes_per_host() {
        let mut with_inventory = Host::new(HostId::new(), HostStatus::Known);
        with_inventory.inventory = Some(inventory_json(4, 16, &[]));
        let without = Host::new(HostId::new(), HostStatus::Known);

        let mut cache = InventoryCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&with_inventory).map(Inventory::cpu_count), Some(4));
        assert!(cache.get(&without).is_none());
        assert_eq!(cache.len(), 2);

        // Later edits to the host are not observed within the same cache.
        with_inventory.inventory = None;
        assert!(cache.get(&with_inventory).is_some());
    }
}
