//! Host metrics sampling
//!
//! Reads CPU, memory, disk and network counters twice with a short gap
//! so that CPU usage and network throughput reflect the current moment
//! rather than the average since boot.

use guardctl_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use sysinfo::{Disks, Networks, System};
use tracing::{debug, instrument};

/// Gap between the two counter reads
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Usage of one mounted filesystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mount_point: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl DiskUsage {
    pub fn percent(&self) -> f64 {
        percent(self.used_bytes, self.total_bytes)
    }
}

/// Throughput of one network interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRate {
    pub interface: String,
    pub rx_per_sec: f64,
    pub tx_per_sec: f64,
    pub rx_total: u64,
    pub tx_total: u64,
}

/// One host metrics sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMetrics {
    pub hostname: String,
    pub uptime_secs: u64,
    pub load_average: [f64; 3],
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub swap_used_bytes: u64,
    pub swap_total_bytes: u64,
    pub disks: Vec<DiskUsage>,
    pub networks: Vec<NetworkRate>,
}

impl HostMetrics {
    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used_bytes, self.memory_total_bytes)
    }

    /// Receive rate summed over all interfaces
    pub fn rx_per_sec(&self) -> f64 {
        self.networks.iter().map(|n| n.rx_per_sec).sum()
    }

    /// Transmit rate summed over all interfaces
    pub fn tx_per_sec(&self) -> f64 {
        self.networks.iter().map(|n| n.tx_per_sec).sum()
    }
}

/// Share of `used` in `total`, 0 for an empty total
pub fn percent(used: u64, total: u64) -> f64 {
    if total > 0 {
        (used as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Per-second rate between two readings of a cumulative counter
///
/// A counter that went backwards (interface reset) gives 0.
pub fn rate_per_sec(before: u64, after: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    after.saturating_sub(before) as f64 / secs
}

/// Format seconds as `3d 4h 12m`
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

fn network_totals(networks: &Networks) -> HashMap<String, (u64, u64)> {
    networks
        .iter()
        .map(|(name, data)| {
            (
                name.to_string(),
                (data.total_received(), data.total_transmitted()),
            )
        })
        .collect()
}

/// Host Metrics Sampler
#[derive(Debug, Clone)]
pub struct HostMetricsSampler {
    interval: Duration,
}

impl Default for HostMetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetricsSampler {
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Take a sample, waiting one interval between the two reads
    #[instrument(skip(self))]
    pub async fn sample(&self) -> Result<HostMetrics> {
        let mut sys = System::new();
        sys.refresh_cpu();
        let mut networks = Networks::new_with_refreshed_list();
        let before = network_totals(&networks);
        let started = Instant::now();

        tokio::time::sleep(self.interval.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;

        sys.refresh_cpu();
        sys.refresh_memory();
        networks.refresh();
        let elapsed = started.elapsed();
        let after = network_totals(&networks);

        let mut rates: Vec<NetworkRate> = after
            .iter()
            .filter(|(name, _)| name.as_str() != "lo")
            .map(|(name, (rx, tx))| {
                let (rx0, tx0) = before.get(name).copied().unwrap_or((*rx, *tx));
                NetworkRate {
                    interface: name.clone(),
                    rx_per_sec: rate_per_sec(rx0, *rx, elapsed),
                    tx_per_sec: rate_per_sec(tx0, *tx, elapsed),
                    rx_total: *rx,
                    tx_total: *tx,
                }
            })
            .collect();
        rates.sort_by(|a, b| a.interface.cmp(&b.interface));

        let disks = Disks::new_with_refreshed_list()
            .iter()
            .filter(|d| d.total_space() > 0)
            .map(|d| DiskUsage {
                mount_point: d.mount_point().display().to_string(),
                total_bytes: d.total_space(),
                used_bytes: d.total_space().saturating_sub(d.available_space()),
            })
            .collect::<Vec<_>>();

        let load = System::load_average();

        let metrics = HostMetrics {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            uptime_secs: System::uptime(),
            load_average: [load.one, load.five, load.fifteen],
            cpu_percent: sys.global_cpu_info().cpu_usage(),
            cpu_count: sys.cpus().len(),
            memory_used_bytes: sys.used_memory(),
            memory_total_bytes: sys.total_memory(),
            swap_used_bytes: sys.used_swap(),
            swap_total_bytes: sys.total_swap(),
            disks,
            networks: rates,
        };

        debug!(
            cpu = metrics.cpu_percent,
            mem_pct = metrics.memory_percent(),
            disks = metrics.disks.len(),
            "Host metrics sampled"
        );

        Ok(metrics)
    }
}
