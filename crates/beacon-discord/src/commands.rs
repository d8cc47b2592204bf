//! The `/add`, `/list` and `/remove` slash commands.

use anyhow::Result;
use common::{Embed, NewSubscription, Platform, Subscription};
use engine::{render, Admin};
use serenity::all::{
    ButtonStyle, ChannelType, CommandInteraction, CommandOptionType, ComponentInteraction, Context,
    CreateActionRow, CreateButton, CreateCommand, CreateCommandOption, EditInteractionResponse,
    Permissions, ResolvedOption, ResolvedValue,
};

use crate::sink;

pub(crate) const ACCEPT: &str = "beacon:accept";
pub(crate) const REJECT: &str = "beacon:reject";

/// Discord allows at most this many fields per embed.
const FIELDS_PER_EMBED: usize = 25;
/// Discord allows at most this many embeds per message.
const EMBEDS_PER_MESSAGE: usize = 10;

fn label(platform: Platform) -> &'static str {
    match platform {
        Platform::Twitch => "Twitch",
        Platform::Kick => "Kick",
        Platform::YoutubeLive => "YouTube Live",
        Platform::YoutubeLatest => "YouTube Latest",
        Platform::YoutubeShort => "YouTube Shorts",
    }
}

fn platform_option(description: &str, required: bool) -> CreateCommandOption {
    let mut option = CreateCommandOption::new(CommandOptionType::String, "platform", description)
        .required(required);

    for platform in Platform::ALL {
        option = option.add_string_choice(label(platform), platform.as_str());
    }

    option
}

fn channel_option(description: &str, required: bool) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Channel, "channel", description)
        .channel_types(vec![ChannelType::Text, ChannelType::News])
        .required(required)
}

/// Definitions of every command.
pub(crate) fn definitions() -> Vec<CreateCommand> {
    let add = CreateCommand::new("add")
        .description("Add a notification for a creator")
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .add_option(platform_option("Choose the platform", true))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "username",
                "Username, handle or channel id on the platform",
            )
            .required(true),
        )
        .add_option(channel_option("Channel to post notifications in", true))
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "message",
            "Message to send along with the notification",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "keep_vod",
            "Keep the message with a link to the VOD once the stream ended",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Role,
            "mention",
            "Role to mention",
        ));

    let list = CreateCommand::new("list")
        .description("List the notifications of this server")
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .add_option(platform_option("Only list a single platform", false));

    let remove = CreateCommand::new("remove")
        .description("Remove a notification")
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .add_option(platform_option("Choose the platform", true))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "username",
                "Username, handle or channel id on the platform",
            )
            .required(true),
        )
        .add_option(channel_option("Only remove the notification of this channel", false));

    vec![add, list, remove]
}

/// A command option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    String(String),
    Bool(bool),
    /// A channel or role.
    Id(String),
}

/// The options a command was invoked with.
#[derive(Debug, Default)]
pub(crate) struct Options {
    values: Vec<(String, Value)>,
}

impl Options {
    fn from_resolved(options: &[ResolvedOption<'_>]) -> Self {
        let mut values = Vec::new();

        for option in options {
            let value = match &option.value {
                ResolvedValue::String(s) => Value::String((*s).to_owned()),
                ResolvedValue::Boolean(b) => Value::Bool(*b),
                ResolvedValue::Channel(c) => Value::Id(c.id.to_string()),
                ResolvedValue::Role(r) => Value::Id(r.id.to_string()),
                _ => continue,
            };

            values.push((option.name.to_owned(), value));
        }

        Self { values }
    }

    #[cfg(test)]
    pub(crate) fn with(mut self, name: &str, value: Value) -> Self {
        self.values.push((name.to_owned(), value));
        self
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn id(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Value::Id(id) => Some(id.as_str()),
            _ => None,
        }
    }

    fn platform(&self) -> Result<Option<Platform>, String> {
        let Some(platform) = self.string("platform") else {
            return Ok(None);
        };

        platform.parse().map(Some).map_err(|e| format!("{}", e))
    }
}

/// Build a draft from the options of `/add`.
pub(crate) fn parse_add(
    options: &Options,
    server_id: &str,
    user_id: &str,
) -> Result<NewSubscription, String> {
    let platform = options.platform()?.ok_or("Missing platform")?;
    let account = options.string("username").ok_or("Missing username")?;
    let channel_id = options.id("channel").ok_or("Missing channel")?;

    Ok(NewSubscription {
        platform,
        account: account.to_owned(),
        display_name: String::new(),
        server_id: server_id.to_owned(),
        channel_id: channel_id.to_owned(),
        added_by: user_id.to_owned(),
        message: options.string("message").map(str::to_owned),
        mention: options.id("mention").map(str::to_owned),
        keep_vod: options.bool("keep_vod").unwrap_or_default(),
        social_links: false,
        social_link_url: None,
    })
}

/// Arguments of `/remove`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Remove {
    pub(crate) platform: Platform,
    pub(crate) account: String,
    pub(crate) channel_id: Option<String>,
}

pub(crate) fn parse_remove(options: &Options) -> Result<Remove, String> {
    let platform = options.platform()?.ok_or("Missing platform")?;
    let account = options.string("username").ok_or("Missing username")?;

    Ok(Remove {
        platform,
        account: account.to_owned(),
        channel_id: options.id("channel").map(str::to_owned),
    })
}

/// Link to the profile of an account.
pub(crate) fn profile_url(platform: Platform, account: &str) -> String {
    match platform {
        Platform::Twitch => format!("https://www.twitch.tv/{}", account),
        Platform::Kick => format!("https://kick.com/{}", account),
        Platform::YoutubeLive => format!("https://www.youtube.com/@{}", account),
        Platform::YoutubeLatest | Platform::YoutubeShort => {
            format!("https://www.youtube.com/channel/{}", account)
        }
    }
}

/// The confirmation prompt shown for a prepared draft.
pub(crate) fn preview(draft: &NewSubscription) -> Embed {
    let mut embed = Embed {
        title: Some(draft.display_name.clone()),
        description: Some(format!(
            "Post {} notifications for {} in <#{}>?",
            label(draft.platform),
            draft.display_name,
            draft.channel_id
        )),
        url: Some(profile_url(draft.platform, &draft.account)),
        color: render::color(draft.platform),
        ..Embed::default()
    };

    if let Some(message) = &draft.message {
        embed = embed.field("Message", message.as_str(), false);
    }

    if let Some(mention) = &draft.mention {
        embed = embed.field("Mention", format!("<@&{}>", mention), true);
    }

    if draft.platform.supports_keep_vod() {
        embed = embed.field("Keep VOD", if draft.keep_vod { "Yes" } else { "No" }, true);
    }

    embed
}

/// Embeds listing the subscriptions of a server, grouped by platform.
pub(crate) fn listing(subscriptions: &[Subscription]) -> Vec<Embed> {
    let mut out = Vec::new();

    for platform in Platform::ALL {
        let group = subscriptions
            .iter()
            .filter(|s| s.platform == platform)
            .collect::<Vec<_>>();

        for (index, chunk) in group.chunks(FIELDS_PER_EMBED).enumerate() {
            let mut embed = Embed {
                title: Some(format!("{} notifications", label(platform))),
                color: render::color(platform),
                ..Embed::default()
            };

            if index == 0 {
                embed.description = Some(format!("Total: {}", group.len()));
            }

            for s in chunk {
                embed = embed.field(
                    format!("{} ({})", s.display_name, s.account),
                    format!("Added by <@{}> in <#{}>", s.added_by, s.channel_id),
                    false,
                );
            }

            out.push(embed);
        }
    }

    out.truncate(EMBEDS_PER_MESSAGE);
    out
}

fn prompt_buttons() -> Vec<CreateActionRow> {
    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(ACCEPT).label("Accept").style(ButtonStyle::Success),
        CreateButton::new(REJECT).label("Reject").style(ButtonStyle::Danger),
    ])]
}

fn is_administrator(command: &CommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|m| m.permissions)
        .is_some_and(|p| p.administrator())
}

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
) -> Result<()> {
    command
        .edit_response(ctx, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

/// Handle a slash command.
pub(crate) async fn run_command(
    ctx: &Context,
    admin: &Admin,
    command: &CommandInteraction,
) -> Result<()> {
    command.defer_ephemeral(ctx).await?;

    let Some(server_id) = command.guild_id.map(|id| id.to_string()) else {
        return reply(ctx, command, "This command can only be used in a server").await;
    };

    if !is_administrator(command) {
        return reply(ctx, command, "You need the Administrator permission to do this").await;
    }

    let options = Options::from_resolved(&command.data.options());

    match command.data.name.as_str() {
        "add" => {
            let draft = match parse_add(&options, &server_id, &command.user.id.to_string()) {
                Ok(draft) => draft,
                Err(e) => return reply(ctx, command, e).await,
            };

            let draft = match admin.prepare(draft).await {
                Ok(draft) => draft,
                Err(e) => {
                    tracing::debug!("Rejected draft: {}", e);
                    return reply(ctx, command, e.to_string()).await;
                }
            };

            let prompt = command
                .edit_response(
                    ctx,
                    EditInteractionResponse::new()
                        .embed(sink::embed(&preview(&draft)))
                        .components(prompt_buttons()),
                )
                .await?;

            admin.stage(prompt.id.to_string(), draft);
        }
        "list" => {
            let platform = match options.platform() {
                Ok(platform) => platform,
                Err(e) => return reply(ctx, command, e).await,
            };

            let mut subscriptions = admin.list(&server_id).await?;

            if let Some(platform) = platform {
                subscriptions.retain(|s| s.platform == platform);
            }

            let embeds = listing(&subscriptions);

            if embeds.is_empty() {
                return reply(ctx, command, "No notifications found").await;
            }

            command
                .edit_response(
                    ctx,
                    EditInteractionResponse::new().embeds(embeds.iter().map(sink::embed).collect()),
                )
                .await?;
        }
        "remove" => {
            let remove = match parse_remove(&options) {
                Ok(remove) => remove,
                Err(e) => return reply(ctx, command, e).await,
            };

            let result = admin
                .remove_matching(
                    &server_id,
                    remove.platform,
                    &remove.account,
                    remove.channel_id.as_deref(),
                )
                .await;

            let content = match result {
                Ok(removed) => {
                    let channels = removed
                        .iter()
                        .map(|s| format!("<#{}>", s.channel_id))
                        .collect::<Vec<_>>();

                    format!(
                        "Removed {} notifications for {} from {}",
                        label(remove.platform),
                        remove.account,
                        channels.join(", ")
                    )
                }
                Err(e) => e.to_string(),
            };

            reply(ctx, command, content).await?;
        }
        other => {
            tracing::warn!(command = other, "Unknown command");
            reply(ctx, command, "Unknown command").await?;
        }
    }

    Ok(())
}

/// Resolve a button press on a confirmation prompt into the text which
/// replaces the prompt.
pub(crate) async fn press(
    admin: &Admin,
    custom_id: &str,
    prompt_id: &str,
    user_id: &str,
) -> Option<String> {
    let content = match custom_id {
        ACCEPT => match admin.confirm(prompt_id, user_id).await {
            Ok(s) => format!(
                "Added {} notifications for {} in <#{}>",
                label(s.platform),
                s.display_name,
                s.channel_id
            ),
            Err(e) => e.to_string(),
        },
        REJECT => match admin.reject(prompt_id) {
            Ok(draft) => format!("Cancelled adding {}", draft.display_name),
            Err(e) => e.to_string(),
        },
        _ => return None,
    };

    Some(content)
}

/// Handle a press on one of the confirmation buttons.
///
/// The press is acknowledged before anything is committed, so Discord's
/// three second deadline holds no matter how slow the store or the platform
/// is.
pub(crate) async fn run_component(
    ctx: &Context,
    admin: &Admin,
    component: &ComponentInteraction,
) -> Result<()> {
    let custom_id = component.data.custom_id.as_str();

    if custom_id != ACCEPT && custom_id != REJECT {
        return Ok(());
    }

    component.defer(ctx).await?;

    let prompt_id = component.message.id.to_string();
    let user_id = component.user.id.to_string();

    let Some(content) = press(admin, custom_id, &prompt_id, &user_id).await else {
        return Ok(());
    };

    let response = EditInteractionResponse::new()
        .content(content)
        .embeds(Vec::new())
        .components(Vec::new());

    component.edit_response(ctx, response).await?;
    Ok(())
}
