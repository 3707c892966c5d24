//! Core library for guardctl
//!
//! This crate defines the command registry, shared container types,
//! the error taxonomy and the alert sink used across all guardctl components.

pub mod command;
pub mod error;
pub mod format;
pub mod notifications;
pub mod shell;
pub mod types;

// Re-exports
pub use command::{
    Command, CommandInput, CommandRegistry, CommandSpec, Field, OptionKind, OptionSpec,
    OptionValue, Reply, Tone,
};
pub use error::{Error, Result};
pub use format::{format_bytes, format_rate, tail_chars};
pub use notifications::{
    mask_token, DiscordWebhookBackend, NotificationBackend, NotificationManager,
    NotificationMessage, Severity,
};
pub use types::{ContainerRef, ContainerStatus, ExecResult, HealthState, Uptime};
