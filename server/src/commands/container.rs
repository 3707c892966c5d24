//! Container lifecycle commands

use async_trait::async_trait;
use futures_util::future::join_all;
use guardctl_core::{
    format_bytes, Command, CommandInput, CommandSpec, ContainerStatus, Error, HealthState,
    OptionSpec, Reply, Result, Tone,
};
use guardctl_plugin_gateway::{ContainerGateway, RestartOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{code_block, ensure_managed};

const DEFAULT_LOG_LINES: i64 = 50;
const MAX_LOG_LINES: i64 = 500;

fn health_icon(health: HealthState) -> &'static str {
    match health {
        HealthState::Healthy => "🟢",
        HealthState::Unhealthy => "🟡",
        HealthState::Stopped => "🔴",
        HealthState::Missing => "⚫",
    }
}

fn health_tone(health: HealthState) -> Tone {
    match health {
        HealthState::Healthy => Tone::Success,
        HealthState::Unhealthy => Tone::Warning,
        HealthState::Stopped | HealthState::Missing => Tone::Error,
    }
}

fn container_option() -> OptionSpec {
    OptionSpec::string("container", "Container name").required()
}

/// Status embed for one container
pub(crate) fn status_reply(status: &ContainerStatus) -> Reply {
    let reply = Reply::new(
        health_tone(status.health),
        format!("{} {}", health_icon(status.health), status.name),
    );

    if !status.exists {
        return reply.description("Container does not exist.");
    }

    reply
        .field("Health", status.health.label(), true)
        .field("State", status.state.as_str(), true)
        .field("Uptime", status.uptime.to_string(), true)
        .field(
            "CPU",
            status
                .cpu_percent
                .map(|c| format!("{:.2}%", c))
                .unwrap_or_else(|| "Unknown".to_string()),
            true,
        )
        .field("Memory", format_bytes(status.memory_usage_bytes), true)
        .field("Status", status.status.as_str(), false)
}

/// `/status [container]`
pub struct StatusCommand {
    gateway: ContainerGateway,
    containers: Arc<Vec<String>>,
}

impl StatusCommand {
    pub fn new(gateway: ContainerGateway, containers: Arc<Vec<String>>) -> Self {
        Self { gateway, containers }
    }

    async fn overview(&self) -> Result<Reply> {
        if self.containers.is_empty() {
            return Ok(Reply::info("🐳 Containers").description("No managed containers configured."));
        }

        let statuses = join_all(self.containers.iter().map(|name| self.gateway.get_status(name)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let attention = statuses.iter().filter(|s| s.health != HealthState::Healthy).count();
        let lines: Vec<String> = statuses
            .iter()
            .map(|s| {
                format!(
                    "{} **{}**: {} ({})",
                    health_icon(s.health),
                    s.name,
                    s.health.label(),
                    s.status
                )
            })
            .collect();

        let reply = if attention == 0 {
            Reply::success("🐳 Containers")
        } else {
            Reply::warning("🐳 Containers")
        };
        Ok(reply
            .description(lines.join("\n"))
            .footer(format!("{} of {} healthy", statuses.len() - attention, statuses.len())))
    }
}

#[async_trait]
impl Command for StatusCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("status", "Show container status")
            .option(OptionSpec::string("container", "Container name (all when omitted)"))
    }

    async fn execute(&self, input: &CommandInput) -> Result<Reply> {
        match input.string("container") {
            Some(name) => {
                let name = ensure_managed(&self.containers, name)?;
                let status = self.gateway.get_status(name).await?;
                Ok(status_reply(&status))
            }
            None => self.overview().await,
        }
    }
}

/// `/logs container [lines]`
pub struct LogsCommand {
    gateway: ContainerGateway,
    containers: Arc<Vec<String>>,
}

impl LogsCommand {
    pub fn new(gateway: ContainerGateway, containers: Arc<Vec<String>>) -> Self {
        Self { gateway, containers }
    }
}

#[async_trait]
impl Command for LogsCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("logs", "Show recent container logs")
            .option(container_option())
            .option(OptionSpec::integer("lines", "Number of lines (default 50, max 500)"))
    }

    async fn execute(&self, input: &CommandInput) -> Result<Reply> {
        let name = input.require_string("container")?;
        let name = ensure_managed(&self.containers, name)?;

        let lines = input.integer("lines").unwrap_or(DEFAULT_LOG_LINES);
        if !(1..=MAX_LOG_LINES).contains(&lines) {
            return Err(Error::Validation(format!(
                "lines must be between 1 and {}",
                MAX_LOG_LINES
            )));
        }

        let logs = self.gateway.logs(name, lines as usize).await?;
        Ok(Reply::info(format!("📜 {} logs", name))
            .description(code_block(&logs))
            .footer(format!("Last {} lines", lines)))
    }
}

/// `/restart container`
pub struct RestartCommand {
    gateway: ContainerGateway,
    containers: Arc<Vec<String>>,
    service_commands: Arc<HashMap<String, Vec<String>>>,
    grace: Duration,
}

impl RestartCommand {
    pub fn new(
        gateway: ContainerGateway,
        containers: Arc<Vec<String>>,
        service_commands: Arc<HashMap<String, Vec<String>>>,
        grace: Duration,
    ) -> Self {
        Self {
            gateway,
            containers,
            service_commands,
            grace,
        }
    }
}

#[async_trait]
impl Command for RestartCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("restart", "Restart a container").option(container_option())
    }

    fn confirmation(&self, input: &CommandInput) -> Option<String> {
        Some(format!(
            "Restart **{}**?",
            input.string("container").unwrap_or_default()
        ))
    }

    async fn execute(&self, input: &CommandInput) -> Result<Reply> {
        let name = input.require_string("container")?;
        let name = ensure_managed(&self.containers, name)?;

        let outcome = self
            .gateway
            .restart(name, self.service_commands.get(name).map(Vec::as_slice))
            .await?;

        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
        }
        let status = self.gateway.get_status(name).await?;

        let method = match outcome {
            RestartOutcome::ServiceCommand => "Service command",
            RestartOutcome::EngineRestart => "Container restart",
        };
        let reply = if status.health == HealthState::Healthy {
            Reply::success(format!("🔄 {} restarted", name))
        } else {
            Reply::warning(format!("🔄 {} restarted, not healthy yet", name))
        };
        Ok(reply
            .field("Method", method, true)
            .field("Health", status.health.label(), true)
            .field("Status", status.status, false))
    }
}

/// `/start container`
pub struct StartCommand {
    gateway: ContainerGateway,
    containers: Arc<Vec<String>>,
}

impl StartCommand {
    pub fn new(gateway: ContainerGateway, containers: Arc<Vec<String>>) -> Self {
        Self { gateway, containers }
    }
}

#[async_trait]
impl Command for StartCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("start", "Start a stopped container").option(container_option())
    }

    async fn execute(&self, input: &CommandInput) -> Result<Reply> {
        let name = input.require_string("container")?;
        let name = ensure_managed(&self.containers, name)?;

        if self.gateway.is_running(name).await? {
            return Ok(Reply::info(format!("▶️ {} is already running", name)));
        }
        self.gateway.start(name).await?;
        Ok(Reply::success(format!("▶️ {} started", name)))
    }
}

/// `/stop container`
pub struct StopCommand {
    gateway: ContainerGateway,
    containers: Arc<Vec<String>>,
}

impl StopCommand {
    pub fn new(gateway: ContainerGateway, containers: Arc<Vec<String>>) -> Self {
        Self { gateway, containers }
    }
}

#[async_trait]
impl Command for StopCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("stop", "Stop a running container").option(container_option())
    }

    fn confirmation(&self, input: &CommandInput) -> Option<String> {
        Some(format!(
            "Stop **{}**? It stays down until started again.",
            input.string("container").unwrap_or_default()
        ))
    }

    async fn execute(&self, input: &CommandInput) -> Result<Reply> {
        let name = input.require_string("container")?;
        let name = ensure_managed(&self.containers, name)?;

        if !self.gateway.is_running(name).await? {
            return Ok(Reply::info(format!("⏹️ {} is not running", name)));
        }
        self.gateway.stop(name).await?;
        Ok(Reply::success(format!("⏹️ {} stopped", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardctl_plugin_gateway::{EngineStats, FakeEngine, Frame};

    fn managed() -> Arc<Vec<String>> {
        Arc::new(vec!["crowdsec".to_string(), "traefik".to_string()])
    }

    fn gateway(engine: FakeEngine) -> (Arc<FakeEngine>, ContainerGateway) {
        let engine = Arc::new(engine);
        (engine.clone(), ContainerGateway::new(engine))
    }

    #[tokio::test]
    async fn test_status_single() {
        let (_, gw) = gateway(
            FakeEngine::new()
                .with_container("crowdsec", "running", "Up 20 hours")
                .with_stats(
                    "crowdsec",
                    EngineStats {
                        cpu_percent: Some(1.5),
                        memory_usage_bytes: Some(1536),
                    },
                ),
        );
        let reply = StatusCommand::new(gw, managed())
            .execute(&CommandInput::new("status").with("container", "crowdsec"))
            .await
            .unwrap();

        assert_eq!(reply.tone, Tone::Success);
        let field = |n: &str| reply.fields.iter().find(|f| f.name == n).unwrap().value.clone();
        assert_eq!(field("Uptime"), "20 hours");
        assert_eq!(field("CPU"), "1.50%");
        assert_eq!(field("Memory"), "1.50 KB");
    }

    #[tokio::test]
    async fn test_status_rejects_unmanaged() {
        let (engine, gw) = gateway(FakeEngine::new().with_container("postgres", "running", "Up 1 hour"));
        let err = StatusCommand::new(gw, managed())
            .execute(&CommandInput::new("status").with("container", "postgres"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_overview() {
        let (_, gw) = gateway(
            FakeEngine::new()
                .with_container("crowdsec", "running", "Up 2 days")
                .with_container("traefik", "exited", "Exited (1) 3 minutes ago"),
        );
        let reply = StatusCommand::new(gw, managed())
            .execute(&CommandInput::new("status"))
            .await
            .unwrap();

        assert_eq!(reply.tone, Tone::Warning);
        let description = reply.description.unwrap();
        assert!(description.contains("🟢 **crowdsec**"));
        assert!(description.contains("🔴 **traefik**"));
        assert_eq!(reply.footer.as_deref(), Some("1 of 2 healthy"));
    }

    #[tokio::test]
    async fn test_logs_bounds_and_output() {
        let (engine, gw) = gateway(
            FakeEngine::new()
                .with_container("traefik", "running", "Up 1 hour")
                .with_logs("traefik", vec![Frame::stdout("line one\n"), Frame::stderr("line two\n")]),
        );
        let command = LogsCommand::new(gw, managed());

        let reply = command
            .execute(&CommandInput::new("logs").with("container", "traefik"))
            .await
            .unwrap();
        let description = reply.description.unwrap();
        assert!(description.contains("line one") && description.contains("line two"));
        assert!(engine.calls().contains(&"logs id-traefik 50".to_string()));

        let err = command
            .execute(&CommandInput::new("logs").with("container", "traefik").with("lines", 501i64))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_restart_prefers_service_command() {
        let (engine, gw) = gateway(
            FakeEngine::new()
                .with_container("crowdsec", "running", "Up 1 hour (unhealthy)")
                .on_exec(|_, _| Ok(vec![Frame::stdout("crowdsec: restarted\n")])),
        );
        let commands = Arc::new(HashMap::from([(
            "crowdsec".to_string(),
            vec!["supervisorctl".to_string(), "restart".to_string(), "crowdsec".to_string()],
        )]));
        let command = RestartCommand::new(gw, managed(), commands, Duration::ZERO);
        let input = CommandInput::new("restart").with("container", "crowdsec");

        assert!(command.confirmation(&input).unwrap().contains("crowdsec"));
        let reply = command.execute(&input).await.unwrap();
        assert_eq!(reply.fields[0].value, "Service command");
        assert!(!engine.calls().iter().any(|c| c.starts_with("restart")));
    }

    #[tokio::test]
    async fn test_restart_engine_fallback_recovers() {
        let (engine, gw) = gateway(FakeEngine::new().with_container("traefik", "exited", "Exited (1)"));
        let command = RestartCommand::new(gw, managed(), Arc::new(HashMap::new()), Duration::ZERO);
        let reply = command
            .execute(&CommandInput::new("restart").with("container", "traefik"))
            .await
            .unwrap();
        assert_eq!(reply.tone, Tone::Success);
        assert_eq!(reply.fields[0].value, "Container restart");
        assert!(engine.calls().contains(&"restart id-traefik".to_string()));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (engine, gw) = gateway(FakeEngine::new().with_container("traefik", "running", "Up 1 hour"));
        let stop = StopCommand::new(gw.clone(), managed());
        let start = StartCommand::new(gw, managed());
        let input = CommandInput::new("stop").with("container", "traefik");

        assert!(stop.confirmation(&input).is_some());
        assert_eq!(stop.execute(&input).await.unwrap().tone, Tone::Success);
        assert_eq!(stop.execute(&input).await.unwrap().tone, Tone::Info);

        let input = CommandInput::new("start").with("container", "traefik");
        assert!(start.confirmation(&input).is_none());
        assert_eq!(start.execute(&input).await.unwrap().tone, Tone::Success);
        assert!(engine.calls().contains(&"start id-traefik".to_string()));
    }

    #[tokio::test]
    async fn test_missing_container_is_not_found() {
        let (_, gw) = gateway(FakeEngine::new());
        let err = StartCommand::new(gw, managed())
            .execute(&CommandInput::new("start").with("container", "crowdsec"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
