//! Status derivation from raw engine data

use guardctl_core::{HealthState, Uptime};
use regex::Regex;
use std::sync::OnceLock;

/// Matches the plain `Up <N> <unit>` phrase and nothing else
fn uptime_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Up (\d+) (second|minute|hour|day|week|month|year)s?$")
            .expect("uptime regex is valid")
    })
}

/// Parse uptime from a status phrase such as `Up 20 hours`
///
/// Any other shape (`Up About an hour`, `Up 2 minutes (healthy)`,
/// `Exited (0) 3 days ago`, localized text) gives `Uptime::Unknown`.
pub fn parse_uptime(status: &str) -> Uptime {
    let Some(caps) = uptime_regex().captures(status.trim()) else {
        return Uptime::Unknown;
    };

    match caps[1].parse::<u64>() {
        Ok(value) => Uptime::Known {
            value,
            unit: caps[2].to_string(),
        },
        Err(_) => Uptime::Unknown,
    }
}

/// Whether the engine's health check flags the container
pub fn is_unhealthy(status: &str) -> bool {
    status.contains("(unhealthy)")
}

/// Classify a container snapshot
///
/// The `(unhealthy)` flag wins over `running`.
pub fn derive_health(exists: bool, running: bool, status: &str) -> HealthState {
    if !exists {
        HealthState::Missing
    } else if !running {
        HealthState::Stopped
    } else if is_unhealthy(status) {
        HealthState::Unhealthy
    } else {
        HealthState::Healthy
    }
}

/// CPU percentage from two cumulative usage samples
pub fn cpu_percent(
    total_usage: u64,
    pre_total_usage: u64,
    system_usage: Option<u64>,
    pre_system_usage: Option<u64>,
    online_cpus: Option<u64>,
) -> Option<f64> {
    let cpu_delta = total_usage as f64 - pre_total_usage as f64;
    let system_delta = system_usage? as f64 - pre_system_usage? as f64;

    if system_delta > 0.0 && cpu_delta >= 0.0 {
        let num_cpus = online_cpus.filter(|n| *n > 0).unwrap_or(1) as f64;
        Some((cpu_delta / system_delta) * num_cpus * 100.0)
    } else {
        None
    }
}
