//! Container engine abstraction and its Docker implementation

use async_trait::async_trait;
use bollard::container::{
    ListContainersOptions, LogOutput, LogsOptions, RestartContainerOptions, StartContainerOptions,
    Stats, StatsOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use futures_util::stream::{Stream, StreamExt};
use guardctl_core::{Error, Result};
use tracing::{debug, info, instrument};

use crate::frame::{Frame, StreamKind};
use crate::status::cpu_percent;

/// Seconds the engine waits before killing a container on stop/restart
const STOP_GRACE_SECS: i64 = 10;

/// A container as listed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContainer {
    pub id: String,
    /// Engine display names, usually with a leading `/`
    pub names: Vec<String>,
    /// `running`, `exited`, `created`, ...
    pub state: String,
    /// Human-readable status phrase
    pub status: String,
}

/// One-shot resource usage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    pub cpu_percent: Option<f64>,
    pub memory_usage_bytes: Option<u64>,
}

/// Operations the gateway needs from a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// All containers, including stopped ones
    async fn list_containers(&self) -> Result<Vec<EngineContainer>>;

    /// Point-in-time stats for a running container
    async fn stats(&self, id: &str) -> Result<EngineStats>;

    /// Run `argv` in the container and return its output frames in arrival order
    async fn exec(&self, id: &str, argv: &[String]) -> Result<Vec<Frame>>;

    /// Last `tail` log lines as frames
    async fn logs(&self, id: &str, tail: usize) -> Result<Vec<Frame>>;

    async fn restart(&self, id: &str) -> Result<()>;

    async fn start(&self, id: &str) -> Result<()>;

    async fn stop(&self, id: &str) -> Result<()>;
}

/// Docker Engine API over the local socket
#[derive(Clone)]
pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    /// Connect with the default unix socket, or `socket` when given
    ///
    /// # Errors
    ///
    /// Returns error if the Docker client cannot be created
    #[instrument]
    pub fn connect(socket: Option<&str>) -> Result<Self> {
        info!("Connecting to Docker daemon");

        let docker = match socket {
            Some(path) => Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_unix_defaults(),
        }
        .map_err(|e| Error::Transport(format!("Failed to connect to Docker: {}", e)))?;

        Ok(Self { docker })
    }
}

/// Map a bollard error, keeping 404/409 responses distinguishable
fn engine_error(context: &str, err: bollard::errors::Error) -> Error {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => Error::NotFound(format!("{}: {}", context, message)),
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message,
        } => Error::NotRunning(format!("{}: {}", context, message)),
        other => Error::Transport(format!("{}: {}", context, other)),
    }
}

fn log_output_frame(output: LogOutput) -> Frame {
    match output {
        LogOutput::StdOut { message } | LogOutput::Console { message } => Frame {
            kind: StreamKind::Stdout,
            payload: message.to_vec(),
        },
        LogOutput::StdErr { message } => Frame {
            kind: StreamKind::Stderr,
            payload: message.to_vec(),
        },
        LogOutput::StdIn { message } => Frame {
            kind: StreamKind::Stdin,
            payload: message.to_vec(),
        },
    }
}

/// Drain an engine output stream until it ends
async fn collect_frames<S>(context: &str, stream: S) -> Result<Vec<Frame>>
where
    S: Stream<Item = std::result::Result<LogOutput, bollard::errors::Error>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut frames = Vec::new();
    while let Some(item) = stream.next().await {
        let output = item.map_err(|e| engine_error(context, e))?;
        frames.push(log_output_frame(output));
    }
    Ok(frames)
}

fn stats_usage(stats: &Stats) -> EngineStats {
    let cpu = &stats.cpu_stats;
    let pre = &stats.precpu_stats;

    EngineStats {
        cpu_percent: cpu_percent(
            cpu.cpu_usage.total_usage,
            pre.cpu_usage.total_usage,
            cpu.system_cpu_usage,
            pre.system_cpu_usage,
            cpu.online_cpus,
        ),
        memory_usage_bytes: stats.memory_stats.usage,
    }
}

#[async_trait]
impl ContainerEngine for BollardEngine {
    async fn list_containers(&self) -> Result<Vec<EngineContainer>> {
        let options = Some(ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        });

        let containers = self
            .docker
            .list_containers(options)
            .await
            .map_err(|e| Error::Transport(format!("Failed to list containers: {}", e)))?;

        debug!(count = containers.len(), "Listed containers");

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(EngineContainer {
                    id: c.id?,
                    names: c.names.unwrap_or_default(),
                    state: c.state.unwrap_or_default(),
                    status: c.status.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn stats(&self, id: &str) -> Result<EngineStats> {
        let options = Some(StatsOptions {
            stream: false,
            one_shot: true,
        });

        let mut stream = Box::pin(self.docker.stats(id, options));
        let stats = stream
            .next()
            .await
            .ok_or_else(|| Error::Transport("No stats available".to_string()))?
            .map_err(|e| engine_error("Failed to get stats", e))?;

        Ok(stats_usage(&stats))
    }

    async fn exec(&self, id: &str, argv: &[String]) -> Result<Vec<Frame>> {
        let exec_config = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(argv.to_vec()),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, exec_config)
            .await
            .map_err(|e| engine_error("Failed to create exec", e))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| engine_error("Failed to start exec", e))?;

        match started {
            StartExecResults::Attached { output, .. } => {
                collect_frames("Exec stream failed", output).await
            }
            StartExecResults::Detached => Err(Error::Transport(
                "Exec started detached; no output to collect".to_string(),
            )),
        }
    }

    async fn logs(&self, id: &str, tail: usize) -> Result<Vec<Frame>> {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        });

        collect_frames("Failed to read logs", self.docker.logs(id, options)).await
    }

    async fn restart(&self, id: &str) -> Result<()> {
        self.docker
            .restart_container(
                id,
                Some(RestartContainerOptions {
                    t: STOP_GRACE_SECS as isize,
                }),
            )
            .await
            .map_err(|e| engine_error("Failed to restart container", e))
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| engine_error("Failed to start container", e))
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
            .map_err(|e| engine_error("Failed to stop container", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_output_mapping() {
        let out = log_output_frame(LogOutput::StdErr {
            message: "oops".into(),
        });
        assert_eq!(out.kind, StreamKind::Stderr);
        assert_eq!(out.payload, b"oops");

        let tty = log_output_frame(LogOutput::Console {
            message: "tty".into(),
        });
        assert_eq!(tty.kind, StreamKind::Stdout);
    }

    #[test]
    fn test_engine_error_mapping() {
        let not_found = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "no such container".into(),
        };
        assert!(matches!(engine_error("x", not_found), Error::NotFound(_)));

        let conflict = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "container is not running".into(),
        };
        assert!(matches!(engine_error("x", conflict), Error::NotRunning(_)));

        let server = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".into(),
        };
        assert!(matches!(engine_error("x", server), Error::Transport(_)));
    }
}
