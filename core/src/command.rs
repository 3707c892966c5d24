//! Command registry traits and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::{Error, Result};

/// Option value type accepted by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    String,
    Integer,
}

/// Typed option schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    pub required: bool,
    /// Allowed string values (empty = free text)
    #[serde(default)]
    pub choices: Vec<String>,
}

impl OptionSpec {
    fn new(name: &str, description: &str, kind: OptionKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: false,
            choices: Vec::new(),
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, description, OptionKind::String)
    }

    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, description, OptionKind::Integer)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Command metadata and option schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Slash command name
    pub name: String,
    pub description: String,
    pub options: Vec<OptionSpec>,
}

impl CommandSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            options: Vec::new(),
        }
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    /// Check an invocation against this schema
    ///
    /// Rejects unknown options, missing required options, mismatched
    /// types and values outside the declared choices.
    pub fn validate(&self, input: &CommandInput) -> Result<()> {
        for name in input.options.keys() {
            if !self.options.iter().any(|o| &o.name == name) {
                return Err(Error::Validation(format!(
                    "/{} has no option '{}'",
                    self.name, name
                )));
            }
        }

        for option in &self.options {
            let Some(value) = input.options.get(&option.name) else {
                if option.required {
                    return Err(Error::Validation(format!(
                        "Missing required option '{}'",
                        option.name
                    )));
                }
                continue;
            };

            if value.kind() != option.kind {
                return Err(Error::Validation(format!(
                    "Option '{}' expects {:?}, got {:?}",
                    option.name,
                    option.kind,
                    value.kind()
                )));
            }

            if let OptionValue::String(s) = value {
                if !option.choices.is_empty() && !option.choices.iter().any(|c| c == s) {
                    return Err(Error::Validation(format!(
                        "Option '{}' must be one of: {}",
                        option.name,
                        option.choices.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A single option value from an invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Integer(i64),
    String(String),
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::String(_) => OptionKind::String,
            OptionValue::Integer(_) => OptionKind::Integer,
        }
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

/// Inbound command invocation
#[derive(Debug, Clone, Default)]
pub struct CommandInput {
    pub command: String,
    pub options: HashMap<String, OptionValue>,
    /// Display name of the invoking user
    pub user: String,
}

impl CommandInput {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
        self.options.insert(name.to_string(), value.into());
        self
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.options.get(name) {
            Some(OptionValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.options.get(name) {
            Some(OptionValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn require_string(&self, name: &str) -> Result<&str> {
        self.string(name)
            .ok_or_else(|| Error::Validation(format!("Missing required option '{}'", name)))
    }
}

/// Reply color family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    Success,
    Info,
    Warning,
    Error,
}

impl Tone {
    /// RGB color used for embeds
    pub fn color(&self) -> u32 {
        match self {
            Tone::Success => 0x2ecc71,
            Tone::Info => 0x3498db,
            Tone::Warning => 0xf39c12,
            Tone::Error => 0xe74c3c,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Formatted command result, rendered as a chat embed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub tone: Tone,
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<Field>,
    pub footer: Option<String>,
}

impl Reply {
    pub fn new(tone: Tone, title: impl Into<String>) -> Self {
        Self {
            tone,
            title: title.into(),
            description: None,
            fields: Vec::new(),
            footer: None,
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(Tone::Success, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(Tone::Info, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(Tone::Warning, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(Tone::Error, title)
    }

    /// Failure reply for an error raised by a handler
    pub fn from_error(err: &Error) -> Self {
        Self::error(format!("❌ {}", err.kind())).description(err.to_string())
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

/// Slash command handler
#[async_trait]
pub trait Command: Send + Sync {
    /// Name, description and option schema
    fn spec(&self) -> CommandSpec;

    /// Prompt to confirm before executing, if this invocation is destructive
    fn confirmation(&self, _input: &CommandInput) -> Option<String> {
        None
    }

    /// Run the command
    async fn execute(&self, input: &CommandInput) -> Result<Reply>;
}

/// Command registry
///
/// Built once at startup; lookup is by command name.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command
    pub fn register(&mut self, command: Arc<dyn Command>) -> Result<()> {
        let spec = command.spec();

        if self.commands.contains_key(&spec.name) {
            return Err(Error::Validation(format!(
                "Command '{}' is already registered",
                spec.name
            )));
        }

        tracing::info!(command = %spec.name, options = spec.options.len(), "Registering command");

        self.commands.insert(spec.name, command);
        Ok(())
    }

    /// Get a command by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Schemas of all commands, sorted by name
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.commands.values().map(|c| c.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
