//! Shared container types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A container resolved by its deployment name
///
/// Only valid for the operation that resolved it; containers may be
/// recreated between calls, so nothing holds on to a `ContainerRef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    /// Engine-assigned container ID
    pub id: String,
    /// Name without the leading `/`
    pub name: String,
}

/// Approximate uptime parsed from the engine's status phrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Uptime {
    Known { value: u64, unit: String },
    Unknown,
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uptime::Known { value, unit } if *value == 1 => write!(f, "1 {}", unit),
            Uptime::Known { value, unit } => write!(f, "{} {}s", value, unit),
            Uptime::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Health classification derived from a status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    /// Running, but the engine health check reports `(unhealthy)`
    Unhealthy,
    Stopped,
    Missing,
}

impl HealthState {
    /// Whether the health monitor should act on this state
    pub fn needs_attention(&self) -> bool {
        matches!(self, HealthState::Unhealthy | HealthState::Stopped)
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthState::Healthy => "Healthy",
            HealthState::Unhealthy => "Unhealthy",
            HealthState::Stopped => "Stopped",
            HealthState::Missing => "Missing",
        }
    }
}

/// Point-in-time container status
///
/// Recomputed on every query. `running` implies `exists`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub exists: bool,
    pub running: bool,
    /// Raw engine state (`running`, `exited`, ...)
    pub state: String,
    /// Raw engine status phrase (`Up 20 hours`, ...)
    pub status: String,
    pub uptime: Uptime,
    pub cpu_percent: Option<f64>,
    pub memory_usage_bytes: Option<u64>,
    pub health: HealthState,
}

impl ContainerStatus {
    /// Sentinel status for a container the engine does not know
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
            running: false,
            state: "unknown".to_string(),
            status: "unknown".to_string(),
            uptime: Uptime::Unknown,
            cpu_percent: None,
            memory_usage_bytes: None,
            health: HealthState::Missing,
        }
    }
}

/// Result of running a command inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    pub error_message: Option<String>,
}

impl ExecResult {
    /// Classify captured output of a command that ran to completion
    ///
    /// Output on stderr counts as failure only when stdout is empty.
    pub fn from_output(stdout: String, stderr: String) -> Self {
        let failed = !stderr.trim().is_empty() && stdout.trim().is_empty();
        let error_message = failed.then(|| stderr.trim().to_string());

        Self {
            succeeded: !failed,
            stdout,
            stderr,
            error_message,
        }
    }

    /// Result for an exec that never reached the process
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            stdout: String::new(),
            stderr: String::new(),
            error_message: Some(message.into()),
        }
    }

    /// Best text to show a user: stdout, else stderr
    pub fn output(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}
