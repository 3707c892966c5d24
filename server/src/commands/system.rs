//! `/system` host metrics

use async_trait::async_trait;
use guardctl_core::{format_bytes, format_rate, Command, CommandInput, CommandSpec, Reply, Result};
use guardctl_plugin_metrics::{format_uptime, HostMetrics, HostMetricsSampler};

pub struct SystemCommand {
    sampler: HostMetricsSampler,
}

impl SystemCommand {
    pub fn new(sampler: HostMetricsSampler) -> Self {
        Self { sampler }
    }
}

/// Render a metrics sample
pub(crate) fn metrics_reply(m: &HostMetrics) -> Reply {
    let reply = if m.memory_percent() >= 90.0 || m.disks.iter().any(|d| d.percent() >= 90.0) {
        Reply::warning(format!("🖥️ {}", m.hostname))
    } else {
        Reply::info(format!("🖥️ {}", m.hostname))
    };

    let disks = if m.disks.is_empty() {
        "No disks".to_string()
    } else {
        m.disks
            .iter()
            .map(|d| {
                format!(
                    "`{}` {} / {} ({:.1}%)",
                    d.mount_point,
                    format_bytes(Some(d.used_bytes)),
                    format_bytes(Some(d.total_bytes)),
                    d.percent()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    reply
        .field("CPU", format!("{:.1}% ({} cores)", m.cpu_percent, m.cpu_count), true)
        .field(
            "Load",
            format!(
                "{:.2} {:.2} {:.2}",
                m.load_average[0], m.load_average[1], m.load_average[2]
            ),
            true,
        )
        .field("Uptime", format_uptime(m.uptime_secs), true)
        .field(
            "Memory",
            format!(
                "{} / {} ({:.1}%)",
                format_bytes(Some(m.memory_used_bytes)),
                format_bytes(Some(m.memory_total_bytes)),
                m.memory_percent()
            ),
            true,
        )
        .field(
            "Swap",
            format!(
                "{} / {}",
                format_bytes(Some(m.swap_used_bytes)),
                format_bytes(Some(m.swap_total_bytes))
            ),
            true,
        )
        .field(
            "Network",
            format!("⬇️ {} ⬆️ {}", format_rate(m.rx_per_sec()), format_rate(m.tx_per_sec())),
            true,
        )
        .field("Disks", disks, false)
}

#[async_trait]
impl Command for SystemCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("system", "Show host CPU, memory, disk and network usage")
    }

    async fn execute(&self, _input: &CommandInput) -> Result<Reply> {
        let metrics = self.sampler.sample().await?;
        Ok(metrics_reply(&metrics))
    }
}
