//! `/backup create|list|delete|restore`

use async_trait::async_trait;
use guardctl_plugin_backup::Archiver;
use guardctl_core::{format_bytes, Command, CommandInput, CommandSpec, Error, OptionSpec, Reply, Result};
use tracing::info;

pub struct BackupCommand {
    archiver: Archiver,
}

impl BackupCommand {
    pub fn new(archiver: Archiver) -> Self {
        Self { archiver }
    }
}

#[async_trait]
impl Command for BackupCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("backup", "Create, list, delete or restore configuration backups")
            .option(
                OptionSpec::string("action", "What to do")
                    .required()
                    .choices(&["create", "list", "delete", "restore"]),
            )
            .option(OptionSpec::string("name", "Backup name, e.g. backup-20240615-031500.tar.gz"))
    }

    fn confirmation(&self, input: &CommandInput) -> Option<String> {
        let name = input.string("name").unwrap_or_default();
        match input.string("action")? {
            "delete" => Some(format!("Delete backup **{}**? This cannot be undone.", name)),
            "restore" => Some(format!(
                "Restore **{}**? Current files are replaced (a safety backup is taken first).",
                name
            )),
            _ => None,
        }
    }

    async fn execute(&self, input: &CommandInput) -> Result<Reply> {
        let action = input.require_string("action")?;

        match action {
            "create" => {
                let archive = self.archiver.create().await?;
                info!(archive = %archive.name, user = %input.user, "Backup created");
                Ok(Reply::success("💾 Backup created")
                    .field("Name", archive.name, true)
                    .field("Size", format_bytes(Some(archive.size_bytes)), true))
            }
            "list" => {
                let archives = self.archiver.list().await?;
                if archives.is_empty() {
                    return Ok(Reply::info("💾 Backups").description("No backups yet."));
                }
                let lines: Vec<String> = archives
                    .iter()
                    .map(|a| format!("`{}` ({})", a.name, format_bytes(Some(a.size_bytes))))
                    .collect();
                Ok(Reply::info("💾 Backups")
                    .description(lines.join("\n"))
                    .footer(format!("{} backups, newest first", archives.len())))
            }
            "delete" => {
                let name = input.require_string("name")?;
                self.archiver.delete(name).await?;
                info!(archive = %name, user = %input.user, "Backup deleted on request");
                Ok(Reply::success(format!("🗑️ Deleted {}", name)))
            }
            "restore" => {
                let name = input.require_string("name")?;
                let report = self.archiver.restore(name).await?;
                info!(archive = %name, user = %input.user, "Backup restored on request");

                let reply = Reply::success(format!("♻️ Restored {}", report.restored));
                Ok(match report.safety_backup {
                    Some(safety) => reply.field("Safety backup", safety.name, false),
                    None => reply.description("Nothing existed to snapshot before restoring."),
                }
                .footer("Restart affected containers to load the restored files"))
            }
            other => Err(Error::Validation(format!("Unknown action '{}'", other))),
        }
    }
}
