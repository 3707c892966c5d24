//! `/autorestart` policy administration

use async_trait::async_trait;
use chrono::Local;
use guardctl_core::{Command, CommandInput, CommandSpec, Error, OptionSpec, Reply, Result};
use guardctl_monitor::{RestartPolicy, RestartPolicyStore};
use std::sync::Arc;

use super::ensure_managed;

const MAX_ATTEMPTS_LIMIT: i64 = 50;

pub struct AutoRestartCommand {
    store: RestartPolicyStore,
    containers: Arc<Vec<String>>,
}

impl AutoRestartCommand {
    pub fn new(store: RestartPolicyStore, containers: Arc<Vec<String>>) -> Self {
        Self { store, containers }
    }

    fn describe(name: &str, policy: &RestartPolicy) -> Reply {
        let today = Local::now().date_naive();
        let reply = if policy.enabled {
            Reply::success(format!("♻️ Auto-restart for {}: enabled", name))
        } else {
            Reply::info(format!("♻️ Auto-restart for {}: disabled", name))
        };
        reply
            .field(
                "Attempts today",
                format!("{}/{}", policy.attempts_on(today), policy.max_attempts_per_day),
                true,
            )
            .field(
                "Last attempt",
                policy
                    .last_attempt_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "Never".to_string()),
                true,
            )
    }
}

#[async_trait]
impl Command for AutoRestartCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("autorestart", "Manage automatic restarts")
            .option(
                OptionSpec::string("action", "What to do")
                    .required()
                    .choices(&["enable", "disable", "status"]),
            )
            .option(OptionSpec::string("container", "Container name").required())
            .option(OptionSpec::integer("max_per_day", "Restart attempts allowed per day"))
    }

    async fn execute(&self, input: &CommandInput) -> Result<Reply> {
        let action = input.require_string("action")?;
        let name = ensure_managed(&self.containers, input.require_string("container")?)?;

        let max = match input.integer("max_per_day") {
            Some(n) if (1..=MAX_ATTEMPTS_LIMIT).contains(&n) => Some(n as u32),
            Some(_) => {
                return Err(Error::Validation(format!(
                    "max_per_day must be between 1 and {}",
                    MAX_ATTEMPTS_LIMIT
                )))
            }
            None => None,
        };

        match action {
            "enable" => {
                let policy = self.store.enable(name, max).await?;
                Ok(Self::describe(name, &policy))
            }
            "disable" => match self.store.disable(name).await? {
                Some(policy) => Ok(Self::describe(name, &policy)),
                None => Ok(Reply::info(format!("♻️ Auto-restart for {}: disabled", name))
                    .description("No policy existed for this container.")),
            },
            "status" => {
                let policy = self.store.get(name).await?.unwrap_or_default();
                Ok(Self::describe(name, &policy))
            }
            other => Err(Error::Validation(format!("Unknown action '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardctl_core::Tone;
    use tempfile::TempDir;

    fn command(dir: &TempDir) -> AutoRestartCommand {
        AutoRestartCommand::new(
            RestartPolicyStore::new(dir.path().join("policy.json")),
            Arc::new(vec!["crowdsec".to_string()]),
        )
    }

    fn input(action: &str) -> CommandInput {
        CommandInput::new("autorestart")
            .with("action", action)
            .with("container", "crowdsec")
    }

    #[tokio::test]
    async fn test_enable_status_disable() {
        let dir = TempDir::new().unwrap();
        let command = command(&dir);

        let reply = command.execute(&input("status")).await.unwrap();
        assert_eq!(reply.tone, Tone::Info);
        assert_eq!(reply.fields[0].value, "0/3");

        let reply = command
            .execute(&input("enable").with("max_per_day", 5i64))
            .await
            .unwrap();
        assert_eq!(reply.tone, Tone::Success);
        assert_eq!(reply.fields[0].value, "0/5");

        let reply = command.execute(&input("disable")).await.unwrap();
        assert_eq!(reply.tone, Tone::Info);
        assert_eq!(reply.fields[0].value, "0/5");
    }

    #[tokio::test]
    async fn test_leading_slash_stored_under_plain_name() {
        let dir = TempDir::new().unwrap();
        let command = command(&dir);

        let reply = command
            .execute(
                &CommandInput::new("autorestart")
                    .with("action", "enable")
                    .with("container", "/crowdsec"),
            )
            .await
            .unwrap();
        assert_eq!(reply.title, "♻️ Auto-restart for crowdsec: enabled");

        assert!(command.store.get("crowdsec").await.unwrap().unwrap().enabled);
        assert!(command.store.get("/crowdsec").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_bad_max_and_container() {
        let dir = TempDir::new().unwrap();
        let command = command(&dir);

        let err = command
            .execute(&input("enable").with("max_per_day", 0i64))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = command
            .execute(
                &CommandInput::new("autorestart")
                    .with("action", "enable")
                    .with("container", "other"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
