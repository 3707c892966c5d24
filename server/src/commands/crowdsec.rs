//! CrowdSec administration through `cscli`

use async_trait::async_trait;
use guardctl_core::{Command, CommandInput, CommandSpec, Error, OptionSpec, Reply, Result};
use guardctl_plugin_gateway::ContainerGateway;
use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;
use tracing::info;

use super::code_block;

const HUB_KINDS: &[&str] = &["parsers", "scenarios", "collections", "appsec-rules"];
const MAX_REASON_LEN: usize = 200;

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+[smhd])+$").expect("duration regex is valid"))
}

fn hub_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Each segment starts alphanumeric, so `..`, dotfiles and flags never match
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*(/[A-Za-z0-9][A-Za-z0-9._-]*)?$")
            .expect("hub name regex is valid")
    })
}

/// Address or network a decision applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Ip(IpAddr),
    Range(IpAddr, u8),
}

impl Target {
    /// Parse `1.2.3.4`, `2001:db8::1` or CIDR notation such as `10.0.0.0/8`
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = || Error::Validation(format!("'{}' is not an IP address or range", input));

        match input.split_once('/') {
            None => input.parse().map(Target::Ip).map_err(|_| invalid()),
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
                let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
                let max = if addr.is_ipv4() { 32 } else { 128 };
                if prefix > max {
                    return Err(invalid());
                }
                Ok(Target::Range(addr, prefix))
            }
        }
    }

    /// `--ip <addr>` or `--range <cidr>`
    fn args(&self) -> [String; 2] {
        match self {
            Target::Ip(ip) => ["--ip".to_string(), ip.to_string()],
            Target::Range(ip, prefix) => ["--range".to_string(), format!("{}/{}", ip, prefix)],
        }
    }
}

/// `cscli` runner bound to the CrowdSec container
#[derive(Clone)]
pub struct Cscli {
    gateway: ContainerGateway,
    container: String,
}

impl Cscli {
    pub fn new(gateway: ContainerGateway, container: impl Into<String>) -> Self {
        Self {
            gateway,
            container: container.into(),
        }
    }

    /// Run `cscli <args> -o human` and return its output
    ///
    /// # Errors
    ///
    /// `CommandFailed` when cscli reports failure
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let mut argv = Vec::with_capacity(args.len() + 3);
        argv.push("cscli");
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["-o", "human"]);

        let result = self.gateway.exec_checked(&self.container, &argv).await?;
        Ok(result.output().to_string())
    }
}

/// Read-only cscli listings (`/bouncers`, `/machines`, `/csmetrics`)
pub struct CscliListCommand {
    name: &'static str,
    description: &'static str,
    title: &'static str,
    args: &'static [&'static str],
    cscli: Cscli,
}

impl CscliListCommand {
    pub fn bouncers(cscli: Cscli) -> Self {
        Self {
            name: "bouncers",
            description: "List registered bouncers",
            title: "🛡️ Bouncers",
            args: &["bouncers", "list"],
            cscli,
        }
    }

    pub fn machines(cscli: Cscli) -> Self {
        Self {
            name: "machines",
            description: "List registered machines",
            title: "🖥️ Machines",
            args: &["machines", "list"],
            cscli,
        }
    }

    pub fn metrics(cscli: Cscli) -> Self {
        Self {
            name: "csmetrics",
            description: "Show CrowdSec metrics",
            title: "📊 CrowdSec metrics",
            args: &["metrics"],
            cscli,
        }
    }
}

#[async_trait]
impl Command for CscliListCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new(self.name, self.description)
    }

    async fn execute(&self, _input: &CommandInput) -> Result<Reply> {
        let output = self.cscli.run(self.args).await?;
        Ok(Reply::info(self.title).description(code_block(&output)))
    }
}

/// `/decisions list|add|delete`
pub struct DecisionsCommand {
    cscli: Cscli,
}

impl DecisionsCommand {
    pub fn new(cscli: Cscli) -> Self {
        Self { cscli }
    }
}

#[async_trait]
impl Command for DecisionsCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("decisions", "List, add or delete CrowdSec decisions")
            .option(
                OptionSpec::string("action", "What to do")
                    .required()
                    .choices(&["list", "add", "delete"]),
            )
            .option(OptionSpec::string("ip", "IP address or CIDR range"))
            .option(OptionSpec::string("duration", "Decision duration (default 4h)"))
            .option(OptionSpec::string("reason", "Reason recorded with the decision"))
            .option(OptionSpec::string("type", "Decision type (default ban)").choices(&["ban", "captcha"]))
    }

    async fn execute(&self, input: &CommandInput) -> Result<Reply> {
        let action = input.require_string("action")?;
        let target = input.string("ip").map(Target::parse).transpose()?;

        match action {
            "list" => {
                let mut args: Vec<String> = vec!["decisions".into(), "list".into()];
                if let Some(t) = &target {
                    args.extend(t.args());
                }
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                let output = self.cscli.run(&args).await?;
                Ok(Reply::info("🚦 Decisions").description(code_block(&output)))
            }
            "add" => {
                let target = target
                    .ok_or_else(|| Error::Validation("'ip' is required to add a decision".into()))?;
                let duration = input.string("duration").unwrap_or("4h");
                if !duration_regex().is_match(duration) {
                    return Err(Error::Validation(format!(
                        "'{}' is not a duration (e.g. 30m, 4h, 1h30m)",
                        duration
                    )));
                }
                let reason = input.string("reason").unwrap_or("Manual decision via Discord");
                if reason.chars().count() > MAX_REASON_LEN {
                    return Err(Error::Validation(format!(
                        "reason is longer than {} characters",
                        MAX_REASON_LEN
                    )));
                }
                let kind = input.string("type").unwrap_or("ban");

                let [flag, value] = target.args();
                let output = self
                    .cscli
                    .run(&[
                        "decisions",
                        "add",
                        flag.as_str(),
                        value.as_str(),
                        "--duration",
                        duration,
                        "--reason",
                        reason,
                        "--type",
                        kind,
                    ])
                    .await?;

                info!(ip = %value, duration, kind, user = %input.user, "Decision added");
                Ok(Reply::success(format!("🚫 {} {} for {}", kind, value, duration))
                    .description(code_block(&output)))
            }
            "delete" => {
                let target = target.ok_or_else(|| {
                    Error::Validation("'ip' is required to delete a decision".into())
                })?;
                let [flag, value] = target.args();
                let output = self
                    .cscli
                    .run(&["decisions", "delete", flag.as_str(), value.as_str()])
                    .await?;

                info!(ip = %value, user = %input.user, "Decision deleted");
                Ok(Reply::success(format!("✅ Decisions for {} deleted", value))
                    .description(code_block(&output)))
            }
            other => Err(Error::Validation(format!("Unknown action '{}'", other))),
        }
    }
}

/// `/hub list|install|remove`
pub struct HubCommand {
    cscli: Cscli,
}

impl HubCommand {
    pub fn new(cscli: Cscli) -> Self {
        Self { cscli }
    }
}

#[async_trait]
impl Command for HubCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("hub", "Manage CrowdSec hub items")
            .option(
                OptionSpec::string("action", "What to do")
                    .required()
                    .choices(&["list", "install", "remove"]),
            )
            .option(OptionSpec::string("kind", "Item kind").required().choices(HUB_KINDS))
            .option(OptionSpec::string("name", "Item name, e.g. crowdsecurity/nginx"))
    }

    fn confirmation(&self, input: &CommandInput) -> Option<String> {
        (input.string("action") == Some("remove")).then(|| {
            format!(
                "Remove {} **{}** from CrowdSec?",
                input.string("kind").unwrap_or_default(),
                input.string("name").unwrap_or_default()
            )
        })
    }

    async fn execute(&self, input: &CommandInput) -> Result<Reply> {
        let action = input.require_string("action")?;
        let kind = input.require_string("kind")?;

        if action == "list" {
            let output = self.cscli.run(&[kind, "list"]).await?;
            return Ok(Reply::info(format!("📦 Hub {}", kind)).description(code_block(&output)));
        }

        let name = input.require_string("name")?;
        if !hub_name_regex().is_match(name) {
            return Err(Error::Validation(format!("'{}' is not a hub item name", name)));
        }

        let output = match action {
            "install" | "remove" => self.cscli.run(&[kind, action, name]).await?,
            other => return Err(Error::Validation(format!("Unknown action '{}'", other))),
        };

        info!(kind, name, action, user = %input.user, "Hub item changed");
        Ok(Reply::success(format!(
            "📦 {} {}",
            name,
            if action == "install" { "installed" } else { "removed" }
        ))
        .description(code_block(&output))
        .footer("Reload CrowdSec to apply hub changes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardctl_core::Tone;
    use guardctl_plugin_gateway::{FakeEngine, Frame};
    use std::sync::Arc;

    fn cscli(engine: FakeEngine) -> (Arc<FakeEngine>, Cscli) {
        let engine = Arc::new(
            engine.with_container("crowdsec", "running", "Up 3 days"),
        );
        (
            engine.clone(),
            Cscli::new(ContainerGateway::new(engine), "crowdsec"),
        )
    }

    fn echo() -> FakeEngine {
        FakeEngine::new().on_exec(|_, argv| Ok(vec![Frame::stdout(argv.join(" "))]))
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(
            Target::parse("192.168.1.10").unwrap(),
            Target::Ip("192.168.1.10".parse().unwrap())
        );
        assert!(matches!(Target::parse("2001:db8::/32").unwrap(), Target::Range(_, 32)));
        assert!(Target::parse("10.0.0.0/33").is_err());
        assert!(Target::parse("example.com").is_err());
        assert!(Target::parse("1.2.3.4; rm -rf /").is_err());
    }

    #[tokio::test]
    async fn test_decisions_add_builds_argv() {
        let (engine, cscli) = cscli(echo());
        let reply = DecisionsCommand::new(cscli)
            .execute(
                &CommandInput::new("decisions")
                    .with("action", "add")
                    .with("ip", "10.0.0.0/24"),
            )
            .await
            .unwrap();

        assert_eq!(reply.tone, Tone::Success);
        assert!(engine.calls().contains(
            &"exec id-crowdsec cscli decisions add --range 10.0.0.0/24 --duration 4h --reason Manual decision via Discord --type ban -o human"
                .to_string()
        ));
    }

    #[tokio::test]
    async fn test_decisions_validation() {
        let (engine, cscli) = cscli(echo());
        let command = DecisionsCommand::new(cscli);

        let missing_ip = CommandInput::new("decisions").with("action", "delete");
        assert!(matches!(command.execute(&missing_ip).await, Err(Error::Validation(_))));

        let bad_duration = CommandInput::new("decisions")
            .with("action", "add")
            .with("ip", "1.2.3.4")
            .with("duration", "forever");
        assert!(matches!(command.execute(&bad_duration).await, Err(Error::Validation(_))));
        assert!(!engine.calls().iter().any(|c| c.starts_with("exec")));
    }

    #[tokio::test]
    async fn test_decisions_list_filters_by_ip() {
        let (engine, cscli) = cscli(echo());
        DecisionsCommand::new(cscli)
            .execute(
                &CommandInput::new("decisions")
                    .with("action", "list")
                    .with("ip", "1.2.3.4"),
            )
            .await
            .unwrap();
        assert!(engine
            .calls()
            .contains(&"exec id-crowdsec cscli decisions list --ip 1.2.3.4 -o human".to_string()));
    }

    #[tokio::test]
    async fn test_stderr_only_is_command_failed() {
        let (_, cscli) = cscli(
            FakeEngine::new().on_exec(|_, _| Ok(vec![Frame::stderr("level=fatal msg=\"no such item\"")])),
        );
        let err = CscliListCommand::bouncers(cscli)
            .execute(&CommandInput::new("bouncers"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed(_)));
        assert!(err.to_string().contains("no such item"));
    }

    #[test]
    fn test_hub_name_rejects_path_segments() {
        for ok in ["crowdsecurity/nginx-logs", "crowdsecurity/http-cve-2021-41773", "my.parser_v2"] {
            assert!(hub_name_regex().is_match(ok), "{}", ok);
        }
        for bad in ["../etc", "..", "crowdsecurity/..", "./x", ".hidden", "-o", "a/b/c", "a/"] {
            assert!(!hub_name_regex().is_match(bad), "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_hub_remove_confirms_and_validates() {
        let (engine, cscli) = cscli(echo());
        let command = HubCommand::new(cscli);

        let remove = CommandInput::new("hub")
            .with("action", "remove")
            .with("kind", "scenarios")
            .with("name", "crowdsecurity/ssh-bf");
        assert!(command.confirmation(&remove).unwrap().contains("crowdsecurity/ssh-bf"));
        let list = CommandInput::new("hub").with("action", "list").with("kind", "parsers");
        assert!(command.confirmation(&list).is_none());

        command.execute(&remove).await.unwrap();
        assert!(engine.calls().contains(
            &"exec id-crowdsec cscli scenarios remove crowdsecurity/ssh-bf -o human".to_string()
        ));

        let bad = CommandInput::new("hub")
            .with("action", "install")
            .with("kind", "parsers")
            .with("name", "../../etc");
        assert!(matches!(command.execute(&bad).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_crowdsec_not_running() {
        let engine = Arc::new(FakeEngine::new().with_container("crowdsec", "exited", "Exited (1)"));
        let cscli = Cscli::new(ContainerGateway::new(engine), "crowdsec");
        let err = CscliListCommand::metrics(cscli)
            .execute(&CommandInput::new("csmetrics"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotRunning(_)));
    }
}
