//! Application state

use guardctl_plugin_backup::Archiver;
use guardctl_core::{CommandRegistry, NotificationManager, Result};
use guardctl_plugin_gateway::{BollardEngine, ContainerEngine, ContainerGateway};
use guardctl_plugin_metrics::HostMetricsSampler;
use guardctl_monitor::{HealthMonitor, RestartPolicyStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::commands::{
    AutoRestartCommand, BackupCommand, Cscli, CscliListCommand, DecisionsCommand, HelpCommand,
    HubCommand, LogsCommand, RestartCommand, StartCommand, StatusCommand, StopCommand, SystemCommand,
};
use crate::config::Config;
use crate::confirm::ConfirmRegistry;

/// Shared application state
///
/// Cheap to clone; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: ContainerGateway,
    pub policies: RestartPolicyStore,
    pub commands: CommandRegistry,
    pub confirmations: ConfirmRegistry,
}

impl AppState {
    /// Connect to the local engine and build the command set
    pub fn new(config: Config) -> Result<Self> {
        let engine = BollardEngine::connect(config.docker_socket.as_deref())?;
        Self::with_engine(config, Arc::new(engine))
    }

    pub fn with_engine(config: Config, engine: Arc<dyn ContainerEngine>) -> Result<Self> {
        let gateway = ContainerGateway::new(engine)
            .with_stats_timeout(Duration::from_millis(config.stats_timeout_ms));
        let policies = RestartPolicyStore::new(&config.restart_policy_path);
        let commands = build_registry(&config, &gateway, &policies)?;

        Ok(Self {
            config: Arc::new(config),
            gateway,
            policies,
            commands,
            confirmations: ConfirmRegistry::new(),
        })
    }

    /// Health monitor over the managed containers
    pub fn monitor(&self, notifier: NotificationManager) -> HealthMonitor {
        HealthMonitor::new(
            self.gateway.clone(),
            self.policies.clone(),
            notifier,
            self.config.containers.clone(),
        )
        .with_service_commands(self.config.service_commands.clone())
        .with_restart_grace(Duration::from_secs(self.config.restart_grace_secs))
    }
}

fn build_registry(
    config: &Config,
    gateway: &ContainerGateway,
    policies: &RestartPolicyStore,
) -> Result<CommandRegistry> {
    let containers = Arc::new(config.containers.clone());
    let service_commands = Arc::new(config.service_commands.clone());
    let grace = Duration::from_secs(config.restart_grace_secs);
    let cscli = Cscli::new(gateway.clone(), config.crowdsec_container.clone());
    let archiver = Archiver::new(
        &config.backup_dir,
        &config.backup_source,
        config.tracked_paths.clone(),
    )
    .with_retention(config.backup_retention);

    let mut registry = CommandRegistry::new();

    // Containers
    registry.register(Arc::new(StatusCommand::new(gateway.clone(), containers.clone())))?;
    registry.register(Arc::new(LogsCommand::new(gateway.clone(), containers.clone())))?;
    registry.register(Arc::new(RestartCommand::new(
        gateway.clone(),
        containers.clone(),
        service_commands,
        grace,
    )))?;
    registry.register(Arc::new(StartCommand::new(gateway.clone(), containers.clone())))?;
    registry.register(Arc::new(StopCommand::new(gateway.clone(), containers.clone())))?;
    registry.register(Arc::new(AutoRestartCommand::new(policies.clone(), containers)))?;

    // CrowdSec
    registry.register(Arc::new(DecisionsCommand::new(cscli.clone())))?;
    registry.register(Arc::new(HubCommand::new(cscli.clone())))?;
    registry.register(Arc::new(CscliListCommand::bouncers(cscli.clone())))?;
    registry.register(Arc::new(CscliListCommand::machines(cscli.clone())))?;
    registry.register(Arc::new(CscliListCommand::metrics(cscli)))?;

    // Host
    registry.register(Arc::new(SystemCommand::new(HostMetricsSampler::new())))?;
    registry.register(Arc::new(BackupCommand::new(archiver)))?;

    let specs = registry.specs();
    registry.register(Arc::new(HelpCommand::new(specs)))?;

    info!(commands = registry.len(), "Command registry ready");
    Ok(registry)
}
