//! Background container health monitoring
//!
//! Polls the configured containers on a fixed interval and restarts the
//! ones that are stopped or flagged unhealthy, within a per-container
//! daily attempt budget persisted to a small JSON file.

pub mod monitor;
pub mod policy;

pub use monitor::{HealthMonitor, MonitorOutcome, PassReport, DEFAULT_INTERVAL};
pub use policy::{RestartPolicy, RestartPolicyConfig, RestartPolicyStore, DEFAULT_MAX_ATTEMPTS};
