//! In-memory engine for tests

use async_trait::async_trait;
use guardctl_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::engine::{ContainerEngine, EngineContainer, EngineStats};
use crate::frame::Frame;

type ExecHandler = Box<dyn Fn(&str, &[String]) -> Result<Vec<Frame>> + Send + Sync>;

#[derive(Default)]
struct FakeState {
    containers: Vec<EngineContainer>,
    stats: HashMap<String, EngineStats>,
    logs: HashMap<String, Vec<Frame>>,
    failing_restarts: HashSet<String>,
    list_failures: usize,
    calls: Vec<String>,
}

/// Scriptable [`ContainerEngine`] that records every call
///
/// Containers get the id `id-<name>` and the display name `/<name>`.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
    exec: Option<ExecHandler>,
    stats_delay: Option<Duration>,
}

fn id_for(name: &str) -> String {
    format!("id-{}", name)
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_container(self, name: &str, state: &str, status: &str) -> Self {
        self.with_raw_container(EngineContainer {
            id: id_for(name),
            names: vec![format!("/{}", name)],
            state: state.to_string(),
            status: status.to_string(),
        })
    }

    pub fn with_raw_container(self, container: EngineContainer) -> Self {
        self.lock().containers.push(container);
        self
    }

    pub fn with_stats(self, name: &str, stats: EngineStats) -> Self {
        self.lock().stats.insert(id_for(name), stats);
        self
    }

    pub fn with_stats_delay(mut self, delay: Duration) -> Self {
        self.stats_delay = Some(delay);
        self
    }

    pub fn with_logs(self, name: &str, frames: Vec<Frame>) -> Self {
        self.lock().logs.insert(id_for(name), frames);
        self
    }

    /// Handle execs with `handler(id, argv)`; without one, execs return no output
    pub fn on_exec<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &[String]) -> Result<Vec<Frame>> + Send + Sync + 'static,
    {
        self.exec = Some(Box::new(handler));
        self
    }

    pub fn with_failing_restart(self, name: &str) -> Self {
        self.lock().failing_restarts.insert(id_for(name));
        self
    }

    /// Make the next `n` list calls fail with a transport error
    pub fn fail_next_lists(&self, n: usize) {
        self.lock().list_failures = n;
    }

    /// Calls in order, e.g. `list`, `exec id-x cscli metrics`, `restart id-x`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    fn check_known(&self, id: &str) -> Result<()> {
        if self.lock().containers.iter().any(|c| c.id == id) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("No such container: {}", id)))
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_containers(&self) -> Result<Vec<EngineContainer>> {
        let mut guard = self.lock();
        guard.calls.push("list".to_string());
        if guard.list_failures > 0 {
            guard.list_failures -= 1;
            return Err(Error::Transport("engine unreachable".to_string()));
        }
        Ok(guard.containers.clone())
    }

    async fn stats(&self, id: &str) -> Result<EngineStats> {
        self.record(format!("stats {}", id));
        if let Some(delay) = self.stats_delay {
            tokio::time::sleep(delay).await;
        }
        self.lock()
            .stats
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Transport("stats unavailable".to_string()))
    }

    async fn exec(&self, id: &str, argv: &[String]) -> Result<Vec<Frame>> {
        self.record(format!("exec {} {}", id, argv.join(" ")));
        self.check_known(id)?;
        match &self.exec {
            Some(handler) => handler(id, argv),
            None => Ok(Vec::new()),
        }
    }

    async fn logs(&self, id: &str, tail: usize) -> Result<Vec<Frame>> {
        self.record(format!("logs {} {}", id, tail));
        self.check_known(id)?;
        Ok(self.lock().logs.get(id).cloned().unwrap_or_default())
    }

    async fn restart(&self, id: &str) -> Result<()> {
        self.record(format!("restart {}", id));
        self.check_known(id)?;
        let mut guard = self.lock();
        if guard.failing_restarts.contains(id) {
            return Err(Error::Transport(format!("restart of {} failed", id)));
        }
        if let Some(c) = guard.containers.iter_mut().find(|c| c.id == id) {
            c.state = "running".to_string();
            c.status = "Up Less than a second".to_string();
        }
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.record(format!("start {}", id));
        self.check_known(id)?;
        if let Some(c) = self.lock().containers.iter_mut().find(|c| c.id == id) {
            c.state = "running".to_string();
            c.status = "Up Less than a second".to_string();
        }
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.record(format!("stop {}", id));
        self.check_known(id)?;
        if let Some(c) = self.lock().containers.iter_mut().find(|c| c.id == id) {
            c.state = "exited".to_string();
            c.status = "Exited (0) Less than a second ago".to_string();
        }
        Ok(())
    }
}
