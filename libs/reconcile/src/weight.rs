//! Host weighting and readiness ordering.
//!
//! Hosts of a cluster are refreshed from the weakest to the strongest, so
//! role suggestions made later in a pass see the weaker hosts already
//! placed. The weight of a host is
//!
//! ```text
//! (cpu_cores - 4) + 0.1 * (memory_gib - 16) + 0.004 * (eligible_disk_gib - 100)
//! ```
//!
//! A marginal core is worth ten GiB of memory and two hundred and fifty GiB
//! of installable disk.

use std::cmp::Ordering;

use crate::inventory::Inventory;
use crate::model::Host;

/// CPU cores a host is expected to have before it scores positively.
pub const MIN_CPU_CORES: f64 = 4.0;

/// Memory, in GiB, a host is expected to have before it scores positively.
pub const MIN_MEMORY_GIB: f64 = 16.0;

/// Eligible disk capacity, in GiB, expected before a host scores positively.
pub const MIN_DISK_CAPACITY_GIB: f64 = 100.0;

/// Weight of one GiB of memory relative to one CPU core.
pub const MEMORY_WEIGHT: f64 = 0.1;

/// Weight of one GiB of eligible disk relative to one CPU core.
pub const DISK_WEIGHT: f64 = 0.004;

/// Computes the weight of a host from its inventory.
pub fn host_weight(inventory: &Inventory) -> f64 {
    (inventory.cpu_count() as f64 - MIN_CPU_CORES)
        + MEMORY_WEIGHT * (inventory.usable_memory_gib() as f64 - MIN_MEMORY_GIB)
        + DISK_WEIGHT * (inventory.eligible_disk_capacity_gib() as f64 - MIN_DISK_CAPACITY_GIB)
}

/// Hosts of one group in refresh order.
#[derive(Debug, Clone, PartialEq)]
pub struct HostOrder<'a> {
    /// Ascending by weight; hosts without inventory first.
    pub hosts: Vec<&'a Host>,

    /// False if any host lacked a parseable inventory. Role suggestions must
    /// not be computed from such a partial view of the group.
    pub all_have_inventory: bool,
}

impl HostOrder<'_> {
    /// Number of hosts in the order.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Orders hosts ascending by weight.
///
/// The sort is stable. Hosts without a parseable inventory compare equal to
/// each other and below every host that has one.
pub fn sort_hosts(hosts: &[Host]) -> HostOrder<'_> {
    let mut weighted: Vec<(Option<f64>, &Host)> = hosts
        .iter()
        .map(|host| (host.parse_inventory().ok().map(|inv| host_weight(&inv)), host))
        .collect();

    let all_have_inventory = weighted.iter().all(|(weight, _)| weight.is_some());

    weighted.sort_by(|(a, _), (b, _)| compare_weights(*a, *b));

    HostOrder {
        hosts: weighted.into_iter().map(|(_, host)| host).collect(),
        all_have_inventory,
    }
}

fn compare_weights(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
