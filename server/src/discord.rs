//! Discord gateway client
//!
//! Registers the command registry as guild slash commands, turns
//! interactions into [`CommandInput`]s for the dispatcher and renders
//! [`Reply`]s as embeds. Every command is deferred first and answered by
//! editing the deferred response.

use async_trait::async_trait;
use guardctl_core::{
    CommandInput, CommandSpec, Error, NotificationBackend, NotificationMessage, OptionKind,
    OptionValue, Reply, Result,
};
use serenity::all::{
    ButtonStyle, ChannelId, CommandDataOptionValue, CommandInteraction, CommandOptionType,
    ComponentInteraction, Context, CreateActionRow, CreateButton, CreateCommand,
    CreateCommandOption, CreateEmbed, CreateEmbedFooter, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateMessage, EditInteractionResponse, EventHandler,
    GuildId, Http, Interaction, Ready, Timestamp,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::confirm::{button_ids, parse_button_id, CONFIRM_TIMEOUT};
use crate::dispatch::dispatch;
use crate::state::AppState;

const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_VALUE_LIMIT: usize = 1024;
const OPTION_DESCRIPTION_LIMIT: usize = 100;

/// Keep at most `max` characters, marking the cut
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

/// Slash command definition for a command spec
pub fn create_command(spec: &CommandSpec) -> CreateCommand {
    spec.options.iter().fold(
        CreateCommand::new(&spec.name).description(clip(&spec.description, OPTION_DESCRIPTION_LIMIT)),
        |command, option| {
            let kind = match option.kind {
                OptionKind::String => CommandOptionType::String,
                OptionKind::Integer => CommandOptionType::Integer,
            };
            let created = option.choices.iter().fold(
                CreateCommandOption::new(
                    kind,
                    &option.name,
                    clip(&option.description, OPTION_DESCRIPTION_LIMIT),
                )
                .required(option.required),
                |o, choice| o.add_string_choice(choice, choice),
            );
            command.add_option(created)
        },
    )
}

/// Typed value of a top-level option
fn option_value(value: &CommandDataOptionValue) -> Option<OptionValue> {
    match value {
        CommandDataOptionValue::String(s) => Some(OptionValue::String(s.clone())),
        CommandDataOptionValue::Integer(i) => Some(OptionValue::Integer(*i)),
        _ => None,
    }
}

fn command_input(interaction: &CommandInteraction) -> CommandInput {
    let mut input = CommandInput::new(interaction.data.name.clone());
    input.user = interaction.user.name.clone();
    for option in &interaction.data.options {
        match option_value(&option.value) {
            Some(value) => {
                input.options.insert(option.name.clone(), value);
            }
            None => debug!(option = %option.name, "Ignoring unsupported option type"),
        }
    }
    input
}

/// Render a reply as an embed
pub fn embed(reply: &Reply) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(clip(&reply.title, TITLE_LIMIT))
        .color(reply.tone.color())
        .timestamp(Timestamp::now());

    if let Some(description) = &reply.description {
        embed = embed.description(clip(description, DESCRIPTION_LIMIT));
    }
    for field in &reply.fields {
        let value = if field.value.trim().is_empty() {
            "-".to_string()
        } else {
            clip(&field.value, FIELD_VALUE_LIMIT)
        };
        embed = embed.field(clip(&field.name, TITLE_LIMIT), value, field.inline);
    }
    if let Some(footer) = &reply.footer {
        embed = embed.footer(CreateEmbedFooter::new(footer));
    }
    embed
}

fn confirm_buttons(id: &str) -> CreateActionRow {
    let (confirm_id, cancel_id) = button_ids(id);
    CreateActionRow::Buttons(vec![
        CreateButton::new(confirm_id)
            .label("Confirm")
            .style(ButtonStyle::Danger),
        CreateButton::new(cancel_id)
            .label("Cancel")
            .style(ButtonStyle::Secondary),
    ])
}

fn ephemeral(content: &str) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

/// Serenity event handler
pub struct Handler {
    state: AppState,
}

impl Handler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    async fn handle_command(&self, ctx: &Context, interaction: &CommandInteraction) {
        if let Err(e) = interaction.defer(&ctx.http).await {
            warn!(command = %interaction.data.name, error = %e, "Failed to defer interaction");
            return;
        }

        let input = command_input(interaction);
        let id = interaction.id.to_string();
        let confirmations = self.state.confirmations.clone();

        let reply = dispatch(&self.state.commands, &input, |prompt| async move {
            let rx = confirmations.open(&id);
            let prompt = Reply::warning("⚠️ Please confirm")
                .description(prompt)
                .footer("Expires in 60 seconds");
            let edit = EditInteractionResponse::new()
                .embed(embed(&prompt))
                .components(vec![confirm_buttons(&id)]);

            if let Err(e) = interaction.edit_response(&ctx.http, edit).await {
                warn!(error = %e, "Failed to show confirmation");
                confirmations.resolve(&id, false);
            }
            confirmations.await_decision(&id, rx, CONFIRM_TIMEOUT).await
        })
        .await;

        let edit = EditInteractionResponse::new()
            .embed(embed(&reply))
            .components(Vec::new());
        if let Err(e) = interaction.edit_response(&ctx.http, edit).await {
            warn!(command = %input.command, error = %e, "Failed to send reply");
        }
    }

    async fn handle_button(&self, ctx: &Context, component: &ComponentInteraction) {
        let Some((id, confirmed)) = parse_button_id(&component.data.custom_id) else {
            debug!(custom_id = %component.data.custom_id, "Ignoring unknown component");
            return;
        };

        #[allow(deprecated)]
        let requester = component.message.interaction.as_ref().map(|i| i.user.id);
        let response = if requester.is_some_and(|user| user != component.user.id) {
            ephemeral("Only the person who ran the command can answer this.")
        } else if self.state.confirmations.resolve(id, confirmed) {
            CreateInteractionResponse::Acknowledge
        } else {
            ephemeral("This confirmation has expired.")
        };

        if let Err(e) = component.create_response(&ctx.http, response).await {
            warn!(error = %e, "Failed to answer button press");
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "Connected to Discord");

        let guild = GuildId::new(self.state.config.guild_id);
        let commands: Vec<CreateCommand> = self
            .state
            .commands
            .specs()
            .iter()
            .map(create_command)
            .collect();

        match guild.set_commands(&ctx.http, commands).await {
            Ok(registered) => {
                info!(guild = %guild, count = registered.len(), "Slash commands registered")
            }
            Err(e) => error!(guild = %guild, error = %e, "Failed to register slash commands"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => self.handle_command(&ctx, &command).await,
            Interaction::Component(component) => self.handle_button(&ctx, &component).await,
            _ => {}
        }
    }
}

/// Alert sink posting embeds to a channel through the bot connection
pub struct ChannelBackend {
    http: Arc<Http>,
    channel: ChannelId,
}

impl ChannelBackend {
    pub fn new(http: Arc<Http>, channel_id: u64) -> Self {
        Self {
            http,
            channel: ChannelId::new(channel_id),
        }
    }
}

#[async_trait]
impl NotificationBackend for ChannelBackend {
    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        let reply = Reply::new(message.severity.tone(), message.title.clone())
            .description(message.body.clone());

        self.channel
            .send_message(&self.http, CreateMessage::new().embed(embed(&reply)))
            .await
            .map_err(|e| {
                Error::NotificationError(format!("Discord channel {}: {}", self.channel, e))
            })?;
        Ok(())
    }

    fn name(&self) -> &str {
        "discord-channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardctl_core::OptionSpec;

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdef", 4), "abc…");
        assert_eq!(clip(&"é".repeat(300), 256).chars().count(), 256);
    }

    #[test]
    fn test_option_value() {
        assert_eq!(
            option_value(&CommandDataOptionValue::String("crowdsec".into())),
            Some(OptionValue::String("crowdsec".into()))
        );
        assert_eq!(
            option_value(&CommandDataOptionValue::Integer(50)),
            Some(OptionValue::Integer(50))
        );
        assert_eq!(option_value(&CommandDataOptionValue::Boolean(true)), None);
    }

    #[test]
    fn test_create_command_carries_options() {
        let spec = CommandSpec::new("hub", "Manage hub items")
            .option(
                OptionSpec::string("kind", "Item kind")
                    .required()
                    .choices(&["parsers", "scenarios"]),
            )
            .option(OptionSpec::integer("limit", "Limit"));

        let value = serde_json::to_value(create_command(&spec)).unwrap();
        assert_eq!(value["name"], "hub");
        assert_eq!(value["description"], "Manage hub items");
        assert_eq!(value["options"][0]["name"], "kind");
        assert_eq!(value["options"][0]["choices"][1]["value"], "scenarios");
        assert_eq!(value["options"][1]["name"], "limit");
    }

    #[test]
    fn test_embed_from_reply() {
        let reply = Reply::error("❌ Not Found")
            .description("Container 'x'")
            .field("Empty", "", true);
        let value = serde_json::to_value(embed(&reply)).unwrap();
        assert_eq!(value["title"], "❌ Not Found");
        assert_eq!(value["description"], "Container 'x'");
        assert_eq!(value["color"], 0xe74c3c);
        assert_eq!(value["fields"][0]["value"], "-");
    }
}
