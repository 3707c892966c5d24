//! Slash command implementations

mod autorestart;
mod backup;
mod container;
mod crowdsec;
mod help;
mod system;

pub use autorestart::AutoRestartCommand;
pub use backup::BackupCommand;
pub use container::{LogsCommand, RestartCommand, StartCommand, StatusCommand, StopCommand};
pub use crowdsec::{Cscli, CscliListCommand, DecisionsCommand, HubCommand};
pub use help::HelpCommand;
pub use system::SystemCommand;

use guardctl_core::{tail_chars, Error, Result};

/// Discord's limit on an embed description
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// Reject containers outside the managed list
///
/// Returns the name without any leading `/`, which is how the command
/// should refer to the container from then on.
pub(crate) fn ensure_managed<'a>(containers: &[String], name: &'a str) -> Result<&'a str> {
    let name = name.trim_start_matches('/');
    if containers.iter().any(|c| c == name) {
        Ok(name)
    } else {
        Err(Error::Validation(format!(
            "'{}' is not a managed container (managed: {})",
            name,
            if containers.is_empty() {
                "none".to_string()
            } else {
                containers.join(", ")
            }
        )))
    }
}

/// Wrap output in a code block that fits an embed description
///
/// Long output keeps its tail.
pub(crate) fn code_block(text: &str) -> String {
    let text = text.trim_end().replace("```", "'''");
    if text.trim().is_empty() {
        return "```\n(no output)\n```".to_string();
    }
    let body = tail_chars(&text, EMBED_DESCRIPTION_LIMIT - 8);
    format!("```\n{}\n```", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_managed() {
        let managed = vec!["crowdsec".to_string(), "traefik".to_string()];
        assert_eq!(ensure_managed(&managed, "crowdsec").unwrap(), "crowdsec");
        assert_eq!(ensure_managed(&managed, "/traefik").unwrap(), "traefik");
        let err = ensure_managed(&managed, "postgres").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("crowdsec, traefik"));
    }

    #[test]
    fn test_code_block_fits_embed() {
        let long = "x".repeat(10_000);
        let block = code_block(&long);
        assert_eq!(block.chars().count(), EMBED_DESCRIPTION_LIMIT);
        assert!(block.starts_with("```\n") && block.ends_with("\n```"));
    }

    #[test]
    fn test_code_block_empty_and_fences() {
        assert_eq!(code_block("  \n"), "```\n(no output)\n```");
        assert!(code_block("a ``` b").contains("a ''' b"));
    }
}
