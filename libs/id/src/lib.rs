//! # fleetmon-id
//!
//! Typed identifiers for the aggregates the host monitor scans.
//!
//! All identifiers render as `{prefix}_{ulid}`:
//!
//! - `cl_01HV4Z2WQXKJNM8GPQY6VBKC3D` (cluster)
//! - `host_01HV4Z3MXNKPQR9HSTZ7WCLD4E` (host)
//! - `ie_01HV4Z4NYPLTRS0JTUA8XDME5F` (infra-env)
//!
//! The ULID body is time-ordered and the prefix is fixed per type, so the
//! string form of two IDs of the same type sorts exactly like the IDs
//! themselves. Batch cursors depend on this: the last ID of a page is the
//! keyset bound for the next one, whether compared in Rust or in SQL.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
