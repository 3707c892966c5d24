//! Command dispatch
//!
//! Looks up the command, validates options, runs the confirmation dialog
//! when the command asks for one, then executes. Every failure becomes an
//! error reply; nothing here returns `Err`.

use guardctl_core::{CommandInput, CommandRegistry, Error, Reply};
use std::future::Future;
use tracing::{info, warn};

use crate::confirm::Decision;

/// Run one command invocation
///
/// `confirm` is called with the prompt only for commands that require
/// confirmation.
pub async fn dispatch<F, Fut>(registry: &CommandRegistry, input: &CommandInput, confirm: F) -> Reply
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Decision>,
{
    let Some(command) = registry.get(&input.command) else {
        let err = Error::NotFound(format!("Unknown command /{}", input.command));
        return Reply::from_error(&err);
    };

    if let Err(e) = command.spec().validate(input) {
        return Reply::from_error(&e);
    }

    if let Some(prompt) = command.confirmation(input) {
        match confirm(prompt).await {
            Decision::Confirmed => {
                info!(command = %input.command, user = %input.user, "Confirmed");
            }
            Decision::Cancelled => {
                return Reply::info("🚫 Cancelled").description("Nothing was changed.");
            }
            Decision::TimedOut => {
                return Reply::warning("⏱️ Confirmation timed out")
                    .description("No answer within 60 seconds. Nothing was changed.");
            }
        }
    }

    match command.execute(input).await {
        Ok(reply) => {
            info!(command = %input.command, user = %input.user, "Command completed");
            reply
        }
        Err(e) => {
            warn!(command = %input.command, user = %input.user, error = %e, "Command failed");
            Reply::from_error(&e)
        }
    }
}
