//! Configuration management

use guardctl_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

fn default_crowdsec_container() -> String {
    "crowdsec".to_string()
}

fn default_restart_policy_path() -> PathBuf {
    PathBuf::from("data/restart_policy.json")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_backup_source() -> PathBuf {
    PathBuf::from(".")
}

fn default_backup_retention() -> usize {
    guardctl_plugin_backup::DEFAULT_RETENTION
}

fn default_monitor_interval_secs() -> u64 {
    300
}

fn default_stats_timeout_ms() -> u64 {
    3000
}

fn default_restart_grace_secs() -> u64 {
    5
}

fn default_health_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bot token; falls back to `DISCORD_TOKEN` / `DISCORD_TOKEN_FILE`
    #[serde(default)]
    pub discord_token: String,

    /// Guild the slash commands are registered in
    pub guild_id: u64,

    /// Channel for monitor alerts
    #[serde(default)]
    pub alert_channel_id: Option<u64>,

    /// Additional webhook for monitor alerts
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Engine socket; the platform default when unset
    #[serde(default)]
    pub docker_socket: Option<String>,

    /// Managed containers, in display and check order
    #[serde(default)]
    pub containers: Vec<String>,

    #[serde(default = "default_crowdsec_container")]
    pub crowdsec_container: String,

    /// In-container restart command per container
    #[serde(default)]
    pub service_commands: HashMap<String, Vec<String>>,

    #[serde(default = "default_restart_policy_path")]
    pub restart_policy_path: PathBuf,

    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Directory the tracked paths are relative to
    #[serde(default = "default_backup_source")]
    pub backup_source: PathBuf,

    #[serde(default)]
    pub tracked_paths: Vec<String>,

    #[serde(default = "default_backup_retention")]
    pub backup_retention: usize,

    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    #[serde(default = "default_stats_timeout_ms")]
    pub stats_timeout_ms: u64,

    /// Wait between a restart and the status re-check
    #[serde(default = "default_restart_grace_secs")]
    pub restart_grace_secs: u64,

    #[serde(default = "default_health_addr")]
    pub health_addr: String,
}

impl Config {
    /// Load configuration from file or environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = if let Some(p) = path {
            Self::load_from_file(p)?
        } else {
            Self::load_from_env()?
        };

        if config.discord_token.is_empty() {
            config.discord_token = get_secret("DISCORD_TOKEN").unwrap_or_default();
        }
        if config.webhook_url.is_none() {
            config.webhook_url = get_secret("DISCORD_WEBHOOK_URL");
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from configuration file
    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables
    fn load_from_env() -> Result<Self> {
        let guild_id = required_env("GUILD_ID")?
            .parse()
            .map_err(|e| Error::ConfigError(format!("Invalid GUILD_ID: {}", e)))?;

        let alert_channel_id = match std::env::var("ALERT_CHANNEL_ID") {
            Ok(v) => Some(
                v.parse()
                    .map_err(|e| Error::ConfigError(format!("Invalid ALERT_CHANNEL_ID: {}", e)))?,
            ),
            Err(_) => None,
        };

        let service_commands = match std::env::var("SERVICE_COMMANDS") {
            Ok(v) => parse_service_commands(&v)?,
            Err(_) => HashMap::new(),
        };

        Ok(Config {
            discord_token: String::new(),
            guild_id,
            alert_channel_id,
            webhook_url: None,
            docker_socket: std::env::var("DOCKER_SOCKET").ok(),
            containers: std::env::var("CONTAINERS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            crowdsec_container: std::env::var("CROWDSEC_CONTAINER")
                .unwrap_or_else(|_| default_crowdsec_container()),
            service_commands,
            restart_policy_path: std::env::var("RESTART_POLICY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_restart_policy_path()),
            backup_dir: std::env::var("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_backup_dir()),
            backup_source: std::env::var("BACKUP_SOURCE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_backup_source()),
            tracked_paths: std::env::var("TRACKED_PATHS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            backup_retention: env_number("BACKUP_RETENTION", default_backup_retention())?,
            monitor_interval_secs: env_number(
                "MONITOR_INTERVAL_SECS",
                default_monitor_interval_secs(),
            )?,
            stats_timeout_ms: env_number("STATS_TIMEOUT_MS", default_stats_timeout_ms())?,
            restart_grace_secs: env_number("RESTART_GRACE_SECS", default_restart_grace_secs())?,
            health_addr: std::env::var("HEALTH_ADDR").unwrap_or_else(|_| default_health_addr()),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            return Err(Error::ConfigError(
                "No Discord token (set discord_token, DISCORD_TOKEN or DISCORD_TOKEN_FILE)"
                    .to_string(),
            ));
        }
        if self.guild_id == 0 {
            return Err(Error::ConfigError("guild_id must be set".to_string()));
        }
        if self.monitor_interval_secs == 0 {
            return Err(Error::ConfigError(
                "monitor_interval_secs must be positive".to_string(),
            ));
        }
        for name in self.service_commands.keys() {
            if !self.containers.contains(name) {
                tracing::warn!(container = %name, "Service command for unmanaged container");
            }
        }
        Ok(())
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::ConfigError(format!("{} is not set", name)))
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|e| Error::ConfigError(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated list, dropping empty entries
fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `name:argv ...;name:argv ...`
fn parse_service_commands(input: &str) -> Result<HashMap<String, Vec<String>>> {
    input
        .split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (name, command) = entry.split_once(':').ok_or_else(|| {
                Error::ConfigError(format!("Invalid service command format: {}", entry))
            })?;
            let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
            if name.trim().is_empty() || argv.is_empty() {
                return Err(Error::ConfigError(format!(
                    "Invalid service command format: {}",
                    entry
                )));
            }
            Ok((name.trim().to_string(), argv))
        })
        .collect()
}

/// Get secret from environment variable or file
///
/// Supports both direct environment variables and file-based secrets (Docker/Kubernetes pattern).
/// If `VAR_NAME` is not found, tries `VAR_NAME_FILE` which should point to a file containing the secret.
pub fn get_secret(var_name: &str) -> Option<String> {
    // Try environment variable first
    if let Ok(value) = std::env::var(var_name) {
        return Some(value);
    }

    // Try file-based secret (Docker secrets / Kubernetes)
    let file_var = format!("{}_FILE", var_name);
    if let Ok(path) = std::env::var(&file_var) {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            return Some(contents.trim().to_string());
        }
    }

    None
}
