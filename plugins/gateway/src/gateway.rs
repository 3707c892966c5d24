//! Name-based container operations

use guardctl_core::{ContainerRef, ContainerStatus, Error, ExecResult, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::engine::{ContainerEngine, EngineContainer, EngineStats};
use crate::frame::{interleaved_lossy, Demuxed};
use crate::status::{derive_health, parse_uptime};

/// Bound on a single stats call
pub const DEFAULT_STATS_TIMEOUT: Duration = Duration::from_millis(3000);

/// How a restart was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// The in-container service manager restarted the service
    ServiceCommand,
    /// The engine restarted the whole container
    EngineRestart,
}

/// Strip the engine's leading separator from a container name
fn normalize(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// Container Gateway
///
/// Every operation re-resolves the container by name.
#[derive(Clone)]
pub struct ContainerGateway {
    engine: Arc<dyn ContainerEngine>,
    stats_timeout: Duration,
}

impl ContainerGateway {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            stats_timeout: DEFAULT_STATS_TIMEOUT,
        }
    }

    pub fn with_stats_timeout(mut self, stats_timeout: Duration) -> Self {
        self.stats_timeout = stats_timeout;
        self
    }

    /// Look up a container, `None` if absent
    async fn find(&self, name: &str) -> Result<Option<(ContainerRef, EngineContainer)>> {
        let wanted = normalize(name);
        let containers = self.engine.list_containers().await?;

        let mut matches = containers
            .into_iter()
            .filter(|c| c.names.iter().any(|n| normalize(n) == wanted));

        let Some(first) = matches.next() else {
            return Ok(None);
        };

        let others = matches.count();
        if others > 0 {
            debug!(container = %wanted, others, "Multiple containers share this name; using the first");
        }

        let container_ref = ContainerRef {
            id: first.id.clone(),
            name: wanted.to_string(),
        };
        Ok(Some((container_ref, first)))
    }

    /// Resolve a container by name, with or without a leading `/`
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if no container has this name
    pub async fn resolve_by_name(&self, name: &str) -> Result<ContainerRef> {
        self.find(name)
            .await?
            .map(|(r, _)| r)
            .ok_or_else(|| Error::NotFound(format!("Container '{}'", normalize(name))))
    }

    /// Resolve a container that must be running
    async fn resolve_running(&self, name: &str) -> Result<ContainerRef> {
        let (container_ref, container) = self
            .find(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Container '{}'", normalize(name))))?;

        if container.state != "running" {
            return Err(Error::NotRunning(format!(
                "{} is {}",
                container_ref.name,
                if container.state.is_empty() {
                    "not started"
                } else {
                    container.state.as_str()
                }
            )));
        }
        Ok(container_ref)
    }

    pub async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(matches!(self.find(name).await?, Some((_, c)) if c.state == "running"))
    }

    /// Status snapshot with best-effort resource usage
    ///
    /// A missing container yields [`ContainerStatus::missing`]. Stats
    /// failures and timeouts degrade the usage fields to `None`.
    ///
    /// # Errors
    ///
    /// Only when the engine cannot list containers
    #[instrument(skip(self))]
    pub async fn get_status(&self, name: &str) -> Result<ContainerStatus> {
        let Some((container_ref, container)) = self.find(name).await? else {
            return Ok(ContainerStatus::missing(normalize(name)));
        };

        let running = container.state == "running";
        let usage = if running {
            self.sample_stats(&container_ref).await
        } else {
            EngineStats::default()
        };

        Ok(ContainerStatus {
            name: container_ref.name,
            exists: true,
            running,
            uptime: parse_uptime(&container.status),
            health: derive_health(true, running, &container.status),
            state: container.state,
            status: container.status,
            cpu_percent: usage.cpu_percent,
            memory_usage_bytes: usage.memory_usage_bytes,
        })
    }

    async fn sample_stats(&self, container_ref: &ContainerRef) -> EngineStats {
        match timeout(self.stats_timeout, self.engine.stats(&container_ref.id)).await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                warn!(container = %container_ref.name, error = %e, "Failed to sample stats");
                EngineStats::default()
            }
            Err(_) => {
                warn!(
                    container = %container_ref.name,
                    timeout_ms = self.stats_timeout.as_millis() as u64,
                    "Stats sampling timed out"
                );
                EngineStats::default()
            }
        }
    }

    /// Run `argv` inside a running container
    ///
    /// # Errors
    ///
    /// `NotFound` / `NotRunning` before any exec is created, `Transport`
    /// when the engine fails mid-call. A command that runs but fails is an
    /// `Ok` result with `succeeded == false`.
    #[instrument(skip(self))]
    pub async fn exec_in_container(&self, name: &str, argv: &[&str]) -> Result<ExecResult> {
        if argv.is_empty() {
            return Err(Error::Validation("Empty command".to_string()));
        }

        let container_ref = self.resolve_running(name).await?;
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();

        debug!(container = %container_ref.name, command = %argv.join(" "), "Executing in container");

        let frames = self.engine.exec(&container_ref.id, &argv).await?;
        let result = Demuxed::collect(frames).into_exec_result();

        if !result.succeeded {
            debug!(container = %container_ref.name, stderr = %result.stderr.trim(), "Command reported failure");
        }
        Ok(result)
    }

    /// Like [`exec_in_container`](Self::exec_in_container), but a failed command is an error
    pub async fn exec_checked(&self, name: &str, argv: &[&str]) -> Result<ExecResult> {
        let result = self.exec_in_container(name, argv).await?;
        if result.succeeded {
            Ok(result)
        } else {
            Err(Error::CommandFailed(
                result
                    .error_message
                    .unwrap_or_else(|| "command reported failure".to_string()),
            ))
        }
    }

    /// Restart a container
    ///
    /// Tries `service_command` inside the container first when one is
    /// given; falls back to an engine-level restart if that is not possible
    /// or reports failure. Returns as soon as the restart is issued.
    #[instrument(skip(self, service_command))]
    pub async fn restart(
        &self,
        name: &str,
        service_command: Option<&[String]>,
    ) -> Result<RestartOutcome> {
        let container_ref = self.resolve_by_name(name).await?;

        if let Some(cmd) = service_command.filter(|c| !c.is_empty()) {
            let argv: Vec<&str> = cmd.iter().map(String::as_str).collect();
            let attempt = match self.exec_in_container(&container_ref.name, &argv).await {
                Ok(result) => result,
                Err(e) => ExecResult::transport_failure(e.to_string()),
            };

            if attempt.succeeded {
                info!(container = %container_ref.name, "Restarted via service command");
                return Ok(RestartOutcome::ServiceCommand);
            }

            warn!(
                container = %container_ref.name,
                error = attempt.error_message.as_deref().unwrap_or("unknown"),
                "Service command restart failed; falling back to engine restart"
            );
        }

        self.engine.restart(&container_ref.id).await?;
        info!(container = %container_ref.name, "Restarted via engine");
        Ok(RestartOutcome::EngineRestart)
    }

    pub async fn start(&self, name: &str) -> Result<()> {
        let container_ref = self.resolve_by_name(name).await?;
        self.engine.start(&container_ref.id).await?;
        info!(container = %container_ref.name, "Container started");
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        let container_ref = self.resolve_by_name(name).await?;
        self.engine.stop(&container_ref.id).await?;
        info!(container = %container_ref.name, "Container stopped");
        Ok(())
    }

    /// Last `tail` lines of the container's log output, both streams in
    /// the order they were written
    pub async fn logs(&self, name: &str, tail: usize) -> Result<String> {
        let container_ref = self.resolve_by_name(name).await?;
        let frames = self.engine.logs(&container_ref.id, tail).await?;
        Ok(interleaved_lossy(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeEngine;
    use crate::frame::Frame;
    use guardctl_core::{HealthState, Uptime};

    fn gateway(engine: &Arc<FakeEngine>) -> ContainerGateway {
        ContainerGateway::new(engine.clone())
    }

    #[tokio::test]
    async fn test_resolve_with_or_without_separator() {
        let engine = Arc::new(FakeEngine::new().with_container("crowdsec", "running", "Up 2 hours"));
        let gw = gateway(&engine);

        let plain = gw.resolve_by_name("crowdsec").await.unwrap();
        let slashed = gw.resolve_by_name("/crowdsec").await.unwrap();
        assert_eq!(plain, slashed);
        assert_eq!(plain.name, "crowdsec");
    }

    #[tokio::test]
    async fn test_resolve_engine_names_without_slash() {
        let engine = Arc::new(FakeEngine::new().with_raw_container(EngineContainer {
            id: "abc".into(),
            names: vec!["traefik".into()],
            state: "running".into(),
            status: "Up 1 hour".into(),
        }));
        let gw = gateway(&engine);
        assert_eq!(gw.resolve_by_name("/traefik").await.unwrap().id, "abc");
    }

    #[tokio::test]
    async fn test_resolve_first_match_wins() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_raw_container(EngineContainer {
                    id: "first".into(),
                    names: vec!["/dup".into()],
                    state: "running".into(),
                    status: "Up 1 hour".into(),
                })
                .with_raw_container(EngineContainer {
                    id: "second".into(),
                    names: vec!["/dup".into()],
                    state: "exited".into(),
                    status: "Exited (0)".into(),
                }),
        );
        assert_eq!(gateway(&engine).resolve_by_name("dup").await.unwrap().id, "first");
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let engine = Arc::new(FakeEngine::new());
        let err = gateway(&engine).resolve_by_name("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_of_missing_container() {
        let engine = Arc::new(FakeEngine::new());
        let status = gateway(&engine).get_status("ghost").await.unwrap();
        assert_eq!(status, ContainerStatus::missing("ghost"));
    }

    #[tokio::test]
    async fn test_status_running_with_stats() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_container("traefik", "running", "Up 20 hours")
                .with_stats(
                    "traefik",
                    EngineStats {
                        cpu_percent: Some(1.5),
                        memory_usage_bytes: Some(1536),
                    },
                ),
        );
        let status = gateway(&engine).get_status("traefik").await.unwrap();
        assert!(status.exists && status.running);
        assert_eq!(status.health, HealthState::Healthy);
        assert_eq!(
            status.uptime,
            Uptime::Known {
                value: 20,
                unit: "hour".into()
            }
        );
        assert_eq!(status.memory_usage_bytes, Some(1536));
    }

    #[tokio::test]
    async fn test_status_unhealthy_flag() {
        let engine = Arc::new(FakeEngine::new().with_container(
            "crowdsec",
            "running",
            "Up 5 minutes (unhealthy)",
        ));
        let status = gateway(&engine).get_status("crowdsec").await.unwrap();
        assert!(status.running);
        assert_eq!(status.health, HealthState::Unhealthy);
        assert_eq!(status.uptime, Uptime::Unknown);
    }

    #[tokio::test]
    async fn test_status_stats_timeout_degrades() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_container("slow", "running", "Up 3 days")
                .with_stats(
                    "slow",
                    EngineStats {
                        cpu_percent: Some(9.0),
                        memory_usage_bytes: Some(10),
                    },
                )
                .with_stats_delay(Duration::from_millis(200)),
        );
        let gw = gateway(&engine).with_stats_timeout(Duration::from_millis(20));
        let status = gw.get_status("slow").await.unwrap();
        assert!(status.running);
        assert_eq!(status.cpu_percent, None);
        assert_eq!(status.memory_usage_bytes, None);
    }

    #[tokio::test]
    async fn test_status_stats_error_degrades() {
        let engine = Arc::new(FakeEngine::new().with_container("web", "running", "Up 3 days"));
        let status = gateway(&engine).get_status("web").await.unwrap();
        assert_eq!(status.cpu_percent, None);
    }

    #[tokio::test]
    async fn test_stopped_container_skips_stats() {
        let engine = Arc::new(FakeEngine::new().with_container("bouncer", "exited", "Exited (1) 2 hours ago"));
        let status = gateway(&engine).get_status("bouncer").await.unwrap();
        assert!(status.exists && !status.running);
        assert_eq!(status.health, HealthState::Stopped);
        assert!(!engine.calls().iter().any(|c| c.starts_with("stats")));
    }

    #[tokio::test]
    async fn test_exec_refuses_stopped_container() {
        let engine = Arc::new(FakeEngine::new().with_container("crowdsec", "exited", "Exited (0)"));
        let err = gateway(&engine)
            .exec_in_container("crowdsec", &["cscli", "decisions", "list"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotRunning(_)));
        assert!(!engine.calls().iter().any(|c| c.starts_with("exec")));
    }

    #[tokio::test]
    async fn test_exec_splits_streams() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_container("crowdsec", "running", "Up 1 hour")
                .on_exec(|_, _| {
                    Ok(vec![
                        Frame::stdout("line 1\n"),
                        Frame::stderr("warn\n"),
                        Frame::stdout("line 2\n"),
                    ])
                }),
        );
        let result = gateway(&engine)
            .exec_in_container("crowdsec", &["cscli", "bouncers", "list"])
            .await
            .unwrap();
        assert!(result.succeeded);
        assert_eq!(result.stdout, "line 1\nline 2\n");
        assert_eq!(result.stderr, "warn\n");
        assert_eq!(
            engine.calls(),
            vec!["list".to_string(), "exec id-crowdsec cscli bouncers list".to_string()]
        );
    }

    #[tokio::test]
    async fn test_exec_checked_stderr_only() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_container("crowdsec", "running", "Up 1 hour")
                .on_exec(|_, _| Ok(vec![Frame::stderr("unknown command\n")])),
        );
        let err = gateway(&engine)
            .exec_checked("crowdsec", &["cscli", "nope"])
            .await
            .unwrap_err();
        match err {
            Error::CommandFailed(msg) => assert_eq!(msg, "unknown command"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exec_transport_error() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_container("crowdsec", "running", "Up 1 hour")
                .on_exec(|_, _| Err(Error::Transport("socket closed".into()))),
        );
        let err = gateway(&engine)
            .exec_in_container("crowdsec", &["cscli", "metrics"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_restart_prefers_service_command() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_container("crowdsec", "running", "Up 1 hour")
                .on_exec(|_, _| Ok(vec![Frame::stdout("restarted\n")])),
        );
        let cmd = vec!["s6-svc".to_string(), "-r".to_string(), "/run/service/crowdsec".to_string()];
        let outcome = gateway(&engine).restart("crowdsec", Some(&cmd)).await.unwrap();
        assert_eq!(outcome, RestartOutcome::ServiceCommand);
        assert!(!engine.calls().iter().any(|c| c.starts_with("restart")));
    }

    #[tokio::test]
    async fn test_restart_falls_back_to_engine() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_container("crowdsec", "running", "Up 1 hour")
                .on_exec(|_, _| Ok(vec![Frame::stderr("s6-svc: fatal\n")])),
        );
        let cmd = vec!["s6-svc".to_string(), "-r".to_string()];
        let outcome = gateway(&engine).restart("crowdsec", Some(&cmd)).await.unwrap();
        assert_eq!(outcome, RestartOutcome::EngineRestart);
        assert!(engine.calls().contains(&"restart id-crowdsec".to_string()));
    }

    #[tokio::test]
    async fn test_restart_stopped_container_uses_engine() {
        let engine = Arc::new(FakeEngine::new().with_container("traefik", "exited", "Exited (1)"));
        let cmd = vec!["kill".to_string(), "-HUP".to_string(), "1".to_string()];
        let outcome = gateway(&engine).restart("traefik", Some(&cmd)).await.unwrap();
        assert_eq!(outcome, RestartOutcome::EngineRestart);
        assert!(gateway(&engine).is_running("traefik").await.unwrap());
    }

    #[tokio::test]
    async fn test_logs_combined() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_container("traefik", "running", "Up 1 hour")
                .with_logs("traefik", vec![Frame::stdout("GET /\n"), Frame::stderr("error\n")]),
        );
        let logs = gateway(&engine).logs("traefik", 50).await.unwrap();
        assert_eq!(logs, "GET /\nerror\n");
    }

    #[tokio::test]
    async fn test_logs_keep_interleaving() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_container("traefik", "running", "Up 1 hour")
                .with_logs(
                    "traefik",
                    vec![
                        Frame::stderr("1 err\n"),
                        Frame::stdout("2 out\n"),
                        Frame::stderr("3 err\n"),
                    ],
                ),
        );
        let logs = gateway(&engine).logs("traefik", 50).await.unwrap();
        assert_eq!(logs, "1 err\n2 out\n3 err\n");
    }

    #[tokio::test]
    async fn test_list_failure_is_transport() {
        let engine = Arc::new(FakeEngine::new().with_container("traefik", "running", "Up 1 hour"));
        engine.fail_next_lists(1);
        let err = gateway(&engine).get_status("traefik").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(gateway(&engine).get_status("traefik").await.is_ok());
    }
}
