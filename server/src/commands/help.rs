//! `/help`

use async_trait::async_trait;
use guardctl_core::{Command, CommandInput, CommandSpec, Reply, Result};

pub struct HelpCommand {
    specs: Vec<CommandSpec>,
}

impl HelpCommand {
    /// `specs` are the other registered commands; `/help` adds itself
    pub fn new(mut specs: Vec<CommandSpec>) -> Self {
        specs.push(Self::own_spec());
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Self { specs }
    }

    fn own_spec() -> CommandSpec {
        CommandSpec::new("help", "List available commands")
    }
}

#[async_trait]
impl Command for HelpCommand {
    fn spec(&self) -> CommandSpec {
        Self::own_spec()
    }

    async fn execute(&self, _input: &CommandInput) -> Result<Reply> {
        let lines: Vec<String> = self
            .specs
            .iter()
            .map(|spec| {
                let options: Vec<String> = spec
                    .options
                    .iter()
                    .map(|o| {
                        if o.required {
                            format!("<{}>", o.name)
                        } else {
                            format!("[{}]", o.name)
                        }
                    })
                    .collect();
                let usage = if options.is_empty() {
                    format!("/{}", spec.name)
                } else {
                    format!("/{} {}", spec.name, options.join(" "))
                };
                format!("`{}`\n{}", usage, spec.description)
            })
            .collect();

        Ok(Reply::info("📖 Commands")
            .description(lines.join("\n"))
            .footer("<required> [optional]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardctl_core::OptionSpec;

    #[tokio::test]
    async fn test_lists_every_command_with_usage() {
        let help = HelpCommand::new(vec![
            CommandSpec::new("status", "Show status").option(OptionSpec::string("container", "Name")),
            CommandSpec::new("logs", "Show logs")
                .option(OptionSpec::string("container", "Name").required())
                .option(OptionSpec::integer("lines", "Lines")),
        ]);

        let text = help
            .execute(&CommandInput::new("help"))
            .await
            .unwrap()
            .description
            .unwrap();
        assert!(text.contains("`/logs <container> [lines]`"));
        assert!(text.contains("`/status [container]`"));
        assert!(text.contains("`/help`"));
        assert!(text.find("/help").unwrap() < text.find("/logs").unwrap());
    }
}
