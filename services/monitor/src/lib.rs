//! fleetmon host monitor library.
//!
//! This crate primarily ships a `host-monitor` binary, but exposes its
//! pieces so the host state machines can be plugged in by embedding the
//! monitor, and for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod leader;
pub mod metrics;
pub mod monitor;
pub mod state;
pub mod store;
