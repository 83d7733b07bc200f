//! # Deployment Event Log
//!
//! Code-keyed structured events for operator visibility. Every event is written
//! to `tracing` and broadcast to any subscribers; nothing in the functional
//! contract depends on an event being observed.

pub mod publisher;

pub use publisher::{DeploymentEvent, EventLog};
