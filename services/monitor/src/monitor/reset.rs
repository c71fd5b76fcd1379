//! Auto-assign role reset.
//!
//! A cluster with an auto-assigned host that has no suggested role would
//! otherwise carry a mix of stale and missing suggestions into the next
//! role refresh. The reset rewrites every auto-assign suggestion in such
//! clusters back to auto-assign in one store statement.

use std::sync::Arc;

use fleetmon_id::RequestId;
use tracing::{debug, info, instrument, warn};

use crate::leader::LeaderElector;
use crate::store::MonitorStore;

/// Leader-gated wrapper around the store's bulk role reset.
#[derive(Clone)]
pub struct AutoAssignReset {
    store: Arc<dyn MonitorStore>,
    leader: Arc<dyn LeaderElector>,
}

impl AutoAssignReset {
    pub fn new(store: Arc<dyn MonitorStore>, leader: Arc<dyn LeaderElector>) -> Self {
        Self { store, leader }
    }

    /// Run the reset once.
    ///
    /// Returns the number of hosts reset, or `None` when the reset did not
    /// run because this replica is not the leader or the store failed. A
    /// failed reset is retried in full by the next pass.
    #[instrument(skip_all, fields(request_id = %request_id))]
    pub async fn run(&self, request_id: RequestId) -> Option<u64> {
        if !self.leader.is_leader() {
            debug!("Not a leader, skipping auto-assign role reset");
            return None;
        }

        match self.store.reset_auto_assign_roles().await {
            Ok(count) => {
                if count > 0 {
                    info!(hosts_reset = count, "Reset auto-assign role suggestions");
                }
                Some(count)
            }
            Err(e) => {
                warn!(error = %e, "Failed to reset auto-assign role suggestions");
                None
            }
        }
    }
}
