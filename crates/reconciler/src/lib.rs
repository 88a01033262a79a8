//! Payment reconciliation engine.
//!
//! Wires the notification parser, the payment matcher, the execution
//! coordinator, and the gateway facade into one long-running service. The
//! binary in `main.rs` is a thin shell over these modules.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod matcher;
pub mod notifier;
pub mod sweeper;
