//! Health monitor loop

use chrono::{Local, NaiveDate};
use guardctl_core::{
    ContainerStatus, Error, HealthState, NotificationManager, NotificationMessage, Result, Severity,
};
use guardctl_plugin_gateway::{ContainerGateway, RestartOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::policy::RestartPolicyStore;

/// Time between passes
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// What a pass did for one container
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    Healthy,
    RestartAttempted {
        attempt: u32,
        max: u32,
        outcome: RestartOutcome,
        recovered: bool,
    },
    AttemptsExhausted {
        max: u32,
    },
    /// Needs attention, but auto-restart is not enabled for it
    AutoRestartDisabled,
    Failed(String),
}

/// Per-container outcomes of one pass, in configured order
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub results: Vec<(String, MonitorOutcome)>,
}

impl PassReport {
    pub fn outcome(&self, name: &str) -> Option<&MonitorOutcome> {
        self.results.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }
}

/// Background health monitor
pub struct HealthMonitor {
    gateway: ContainerGateway,
    store: RestartPolicyStore,
    notifier: NotificationManager,
    containers: Vec<String>,
    service_commands: HashMap<String, Vec<String>>,
    restart_grace: Duration,
}

impl HealthMonitor {
    pub fn new(
        gateway: ContainerGateway,
        store: RestartPolicyStore,
        notifier: NotificationManager,
        containers: Vec<String>,
    ) -> Self {
        Self {
            gateway,
            store,
            notifier,
            containers,
            service_commands: HashMap::new(),
            restart_grace: Duration::from_secs(5),
        }
    }

    pub fn with_service_commands(mut self, commands: HashMap<String, Vec<String>>) -> Self {
        self.service_commands = commands;
        self
    }

    pub fn with_restart_grace(mut self, grace: Duration) -> Self {
        self.restart_grace = grace;
        self
    }

    /// Run passes every `every` until the handle is aborted
    ///
    /// The first pass happens one interval after spawning.
    pub fn spawn(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        info!(interval_secs = every.as_secs(), containers = self.containers.len(), "Starting health monitor");

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let report = self.run_pass(Local::now().date_naive()).await;
                let unhealthy = report
                    .results
                    .iter()
                    .filter(|(_, o)| *o != MonitorOutcome::Healthy)
                    .count();
                info!(checked = report.results.len(), unhealthy, "Health pass complete");
            }
        })
    }

    /// Check every configured container once
    ///
    /// A failure on one container is logged and alerted, and the pass
    /// moves on to the next.
    #[instrument(skip(self))]
    pub async fn run_pass(&self, today: NaiveDate) -> PassReport {
        let mut report = PassReport::default();

        for name in &self.containers {
            let outcome = match self.check_container(name, today).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(container = %name, error = %e, "Health check failed");
                    self.alert(NotificationMessage::new(
                        Severity::Critical,
                        format!("🚨 Health check failed: {}", name),
                        e.to_string(),
                    ))
                    .await;
                    MonitorOutcome::Failed(e.to_string())
                }
            };
            report.results.push((name.clone(), outcome));
        }

        report
    }

    async fn check_container(&self, name: &str, today: NaiveDate) -> Result<MonitorOutcome> {
        let status = self.gateway.get_status(name).await?;

        if status.health == HealthState::Missing {
            return Err(Error::NotFound(format!("Container '{}' does not exist", name)));
        }
        if !status.health.needs_attention() {
            return Ok(MonitorOutcome::Healthy);
        }

        let reason = describe(&status);
        let policy = self.store.get(name).await?.unwrap_or_default();

        if !policy.enabled {
            warn!(container = %name, reason = %reason, "Container needs attention; auto-restart disabled");
            self.alert(NotificationMessage::new(
                Severity::Warning,
                format!("⚠️ {} needs attention", name),
                format!("{}\nAuto-restart is disabled for this container.", reason),
            ))
            .await;
            return Ok(MonitorOutcome::AutoRestartDisabled);
        }

        let max = policy.max_attempts_per_day;
        if !policy.can_attempt(today) {
            warn!(container = %name, max, "Restart attempts exhausted for today");
            self.alert(NotificationMessage::new(
                Severity::Critical,
                format!("🛑 {} restart attempts exhausted", name),
                format!(
                    "{}\nAll {} restart attempts for today have been used. Manual intervention required.",
                    reason, max
                ),
            ))
            .await;
            return Ok(MonitorOutcome::AttemptsExhausted { max });
        }

        // Counted before restarting so a failing restart still consumes budget
        let attempt = self.store.record_attempt(name, today).await?;
        let outcome = self
            .gateway
            .restart(name, self.service_commands.get(name).map(Vec::as_slice))
            .await?;

        if !self.restart_grace.is_zero() {
            tokio::time::sleep(self.restart_grace).await;
        }
        let after = self.gateway.get_status(name).await?;
        let recovered = after.health == HealthState::Healthy;

        info!(container = %name, attempt, max, recovered, "Auto-restart attempted");
        self.alert(NotificationMessage::new(
            if recovered { Severity::Info } else { Severity::Warning },
            format!("🔄 {} restarted ({}/{})", name, attempt, max),
            format!(
                "{}\nRestart via {}. Now: {} ({})",
                reason,
                match outcome {
                    RestartOutcome::ServiceCommand => "service command",
                    RestartOutcome::EngineRestart => "engine restart",
                },
                after.health.label(),
                after.status
            ),
        ))
        .await;

        Ok(MonitorOutcome::RestartAttempted {
            attempt,
            max,
            outcome,
            recovered,
        })
    }

    async fn alert(&self, message: NotificationMessage) {
        if let Err(e) = self.notifier.send(&message).await {
            warn!(title = %message.title, error = %e, "Failed to deliver alert");
        }
    }
}

fn describe(status: &ContainerStatus) -> String {
    match status.health {
        HealthState::Unhealthy => format!("Health check reports unhealthy: {}", status.status),
        _ => format!("Container is {} ({})", status.state, status.status),
    }
}
