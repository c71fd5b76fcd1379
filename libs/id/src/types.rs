//! ID definitions for the monitored aggregates.

use crate::define_id;

define_id!(ClusterId, "cl");
define_id!(HostId, "host");
define_id!(InfraEnvId, "ie");

// Correlates the log lines of one monitoring phase.
define_id!(RequestId, "req");
