//! Typed description of a notification, independent of how a sink renders it.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A field shown in the body of an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// The rich part of a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    /// RGB colour of the embed accent.
    pub color: u32,
    pub author: Option<String>,
    pub author_icon: Option<String>,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A button which opens a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// Everything needed to create or edit a notification message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationContent {
    /// Plain text content, carrying mentions and the custom message.
    pub content: Option<String>,
    pub embed: Embed,
    pub buttons: Vec<LinkButton>,
}

impl Embed {
    /// Push a field onto the embed.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

impl NotificationContent {
    /// Push a link button.
    pub fn button(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.buttons.push(LinkButton {
            label: label.into(),
            url: url.into(),
        });
        self
    }
}
