//! Per-container auto-restart policy
//!
//! The whole document is read, modified and rewritten on each change. There
//! is a single bot process, so no file locking is done.

use chrono::NaiveDate;
use guardctl_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Daily restart budget for a newly enabled container
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Auto-restart settings for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    pub enabled: bool,
    pub max_attempts_per_day: u32,
    #[serde(default)]
    pub attempts_today: u32,
    #[serde(default)]
    pub last_attempt_date: Option<NaiveDate>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts_per_day: DEFAULT_MAX_ATTEMPTS,
            attempts_today: 0,
            last_attempt_date: None,
        }
    }
}

impl RestartPolicy {
    /// Attempts counted against `today`; a stale date counts as zero
    pub fn attempts_on(&self, today: NaiveDate) -> u32 {
        if self.last_attempt_date == Some(today) {
            self.attempts_today
        } else {
            0
        }
    }

    pub fn can_attempt(&self, today: NaiveDate) -> bool {
        self.enabled && self.attempts_on(today) < self.max_attempts_per_day
    }

    /// Count one attempt on `today`, resetting the counter on a new day
    ///
    /// Returns the attempt number.
    pub fn register_attempt(&mut self, today: NaiveDate) -> u32 {
        if self.last_attempt_date != Some(today) {
            self.attempts_today = 0;
        }
        self.attempts_today += 1;
        self.last_attempt_date = Some(today);
        self.attempts_today
    }
}

/// The persisted document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicyConfig {
    #[serde(default)]
    pub containers: BTreeMap<String, RestartPolicy>,
}

/// JSON file holding every container's policy
#[derive(Debug, Clone)]
pub struct RestartPolicyStore {
    path: PathBuf,
}

impl RestartPolicyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document; a missing file is an empty config
    pub async fn load(&self) -> Result<RestartPolicyConfig> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(RestartPolicyConfig::default()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::ConfigError(format!(
                    "Failed to parse {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No restart policy file yet");
                Ok(RestartPolicyConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, config: &RestartPolicyConfig) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Option<RestartPolicy>> {
        Ok(self.load().await?.containers.remove(name))
    }

    /// Enable auto-restart, creating the policy on first use
    pub async fn enable(&self, name: &str, max_attempts_per_day: Option<u32>) -> Result<RestartPolicy> {
        let mut config = self.load().await?;
        let policy = config.containers.entry(name.to_string()).or_default();
        policy.enabled = true;
        if let Some(max) = max_attempts_per_day {
            policy.max_attempts_per_day = max;
        }
        let policy = policy.clone();
        self.save(&config).await?;

        info!(container = %name, max = policy.max_attempts_per_day, "Auto-restart enabled");
        Ok(policy)
    }

    /// Disable auto-restart; `None` if the container never had a policy
    pub async fn disable(&self, name: &str) -> Result<Option<RestartPolicy>> {
        let mut config = self.load().await?;
        let Some(policy) = config.containers.get_mut(name) else {
            return Ok(None);
        };
        policy.enabled = false;
        let policy = policy.clone();
        self.save(&config).await?;

        info!(container = %name, "Auto-restart disabled");
        Ok(Some(policy))
    }

    /// Persist one restart attempt; returns the attempt number for `today`
    pub async fn record_attempt(&self, name: &str, today: NaiveDate) -> Result<u32> {
        let mut config = self.load().await?;
        let attempt = config
            .containers
            .entry(name.to_string())
            .or_default()
            .register_attempt(today);
        self.save(&config).await?;
        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_new_day_resets_counter() {
        let mut policy = RestartPolicy {
            enabled: true,
            max_attempts_per_day: 5,
            attempts_today: 3,
            last_attempt_date: Some(day(9)),
        };
        assert_eq!(policy.register_attempt(day(10)), 1);
        assert_eq!(policy.attempts_today, 1);
        assert_eq!(policy.last_attempt_date, Some(day(10)));
    }

    #[test]
    fn test_same_day_increments() {
        let mut policy = RestartPolicy::default();
        policy.register_attempt(day(1));
        assert_eq!(policy.register_attempt(day(1)), 2);
    }

    #[test]
    fn test_can_attempt() {
        let mut policy = RestartPolicy {
            enabled: true,
            max_attempts_per_day: 3,
            attempts_today: 3,
            last_attempt_date: Some(day(2)),
        };
        assert!(!policy.can_attempt(day(2)));
        assert!(policy.can_attempt(day(3)));
        policy.enabled = false;
        assert!(!policy.can_attempt(day(3)));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = RestartPolicyStore::new(dir.path().join("policy.json"));
        assert_eq!(store.load().await.unwrap(), RestartPolicyConfig::default());
        assert_eq!(store.get("crowdsec").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_enable_disable_persist() {
        let dir = TempDir::new().unwrap();
        let store = RestartPolicyStore::new(dir.path().join("nested/policy.json"));

        let policy = store.enable("crowdsec", Some(5)).await.unwrap();
        assert!(policy.enabled);
        assert_eq!(policy.max_attempts_per_day, 5);

        let reloaded = RestartPolicyStore::new(store.path());
        assert_eq!(reloaded.get("crowdsec").await.unwrap(), Some(policy));

        let disabled = store.disable("crowdsec").await.unwrap().unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.max_attempts_per_day, 5);
        assert_eq!(store.disable("unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_attempt_persists() {
        let dir = TempDir::new().unwrap();
        let store = RestartPolicyStore::new(dir.path().join("policy.json"));
        store.enable("traefik", None).await.unwrap();

        assert_eq!(store.record_attempt("traefik", day(4)).await.unwrap(), 1);
        assert_eq!(store.record_attempt("traefik", day(4)).await.unwrap(), 2);
        let policy = store.get("traefik").await.unwrap().unwrap();
        assert_eq!(policy.attempts_today, 2);
        assert_eq!(policy.last_attempt_date, Some(day(4)));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = RestartPolicyStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
