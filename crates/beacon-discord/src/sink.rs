use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::anyhow;
use common::{Embed, NotificationContent, NotificationSink, SinkError};
use serenity::all::{
    ChannelId, CreateActionRow, CreateButton, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter,
    CreateMessage, EditMessage, Http, MessageId, Timestamp,
};
use serenity::async_trait;
use serenity::http::HttpError;

/// Discord error code for an unknown channel.
const UNKNOWN_CHANNEL: isize = 10003;
/// Discord error code for an unknown message.
const UNKNOWN_MESSAGE: isize = 10008;
/// Discord error code for missing access to a channel.
const MISSING_ACCESS: isize = 50001;
/// Discord error code for missing permissions in a channel.
const MISSING_PERMISSIONS: isize = 50013;

/// Posts notifications through the Discord REST API.
#[derive(Clone)]
pub struct SerenitySink {
    http: Arc<Http>,
}

impl SerenitySink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Construct a sink with its own REST client for the given bot token.
    pub fn from_token(token: &str) -> Self {
        Self::new(Arc::new(Http::new(token)))
    }

    /// The REST client, for sharing with other Discord lookups.
    pub fn http(&self) -> Arc<Http> {
        self.http.clone()
    }
}

fn parse_id(id: &str) -> Option<NonZeroU64> {
    id.trim().parse().ok()
}

fn channel_id(id: &str) -> Result<ChannelId, SinkError> {
    let id = parse_id(id).ok_or_else(|| SinkError::ChannelUnavailable(id.to_owned()))?;
    Ok(ChannelId::new(id.get()))
}

fn message_id(id: &str) -> Result<MessageId, SinkError> {
    let id = parse_id(id).ok_or(SinkError::MessageNotFound)?;
    Ok(MessageId::new(id.get()))
}

/// Classify an error returned by Discord.
fn classify(channel: ChannelId, error: serenity::Error) -> SinkError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &error {
        match response.error.code {
            UNKNOWN_MESSAGE => return SinkError::MessageNotFound,
            UNKNOWN_CHANNEL | MISSING_ACCESS | MISSING_PERMISSIONS => {
                return SinkError::ChannelUnavailable(channel.to_string());
            }
            _ => {}
        }

        if response.status_code.as_u16() == 403 {
            return SinkError::ChannelUnavailable(channel.to_string());
        }
    }

    SinkError::Other(anyhow!(error).context(format!("discord request to channel {}", channel)))
}

/// Convert an embed into its Discord form.
pub(crate) fn embed(embed: &Embed) -> CreateEmbed {
    let mut out = CreateEmbed::new().colour(embed.color);

    if let Some(title) = &embed.title {
        out = out.title(title);
    }

    if let Some(description) = &embed.description {
        out = out.description(description);
    }

    if let Some(url) = &embed.url {
        out = out.url(url);
    }

    if let Some(author) = &embed.author {
        let mut author = CreateEmbedAuthor::new(author);

        if let Some(icon) = &embed.author_icon {
            author = author.icon_url(icon);
        }

        out = out.author(author);
    }

    if let Some(thumbnail) = &embed.thumbnail {
        out = out.thumbnail(thumbnail);
    }

    if let Some(image) = &embed.image {
        out = out.image(image);
    }

    for field in &embed.fields {
        out = out.field(&field.name, &field.value, field.inline);
    }

    if let Some(footer) = &embed.footer {
        out = out.footer(CreateEmbedFooter::new(footer));
    }

    if let Some(timestamp) = &embed.timestamp {
        if let Ok(timestamp) = Timestamp::from_unix_timestamp(timestamp.timestamp()) {
            out = out.timestamp(timestamp);
        }
    }

    out
}

fn components(content: &NotificationContent) -> Vec<CreateActionRow> {
    if content.buttons.is_empty() {
        return Vec::new();
    }

    let buttons = content
        .buttons
        .iter()
        .map(|b| CreateButton::new_link(&b.url).label(&b.label))
        .collect();

    vec![CreateActionRow::Buttons(buttons)]
}

#[async_trait]
impl NotificationSink for SerenitySink {
    async fn send_message(
        &self,
        channel_id: &str,
        content: &NotificationContent,
    ) -> Result<String, SinkError> {
        let channel = self::channel_id(channel_id)?;

        let mut builder = CreateMessage::new()
            .embed(embed(&content.embed))
            .components(components(content));

        if let Some(text) = &content.content {
            builder = builder.content(text);
        }

        let message = channel
            .send_message(&*self.http, builder)
            .await
            .map_err(|e| classify(channel, e))?;

        tracing::debug!(channel = channel_id, message = %message.id, "Sent message");
        Ok(message.id.to_string())
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &NotificationContent,
    ) -> Result<(), SinkError> {
        let channel = self::channel_id(channel_id)?;
        let message = self::message_id(message_id)?;

        let builder = EditMessage::new()
            .content(content.content.clone().unwrap_or_default())
            .embed(embed(&content.embed))
            .components(components(content));

        channel
            .edit_message(&*self.http, message, builder)
            .await
            .map_err(|e| classify(channel, e))?;

        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), SinkError> {
        let channel = self::channel_id(channel_id)?;
        let message = self::message_id(message_id)?;

        channel
            .delete_message(&*self.http, message)
            .await
            .map_err(|e| classify(channel, e))?;

        Ok(())
    }
}
