//! Read-only view of the Discord servers the bot is a member of.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A server as shown to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Guild {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub owner_id: String,
    pub member_count: Option<u64>,
    pub roles: Vec<GuildRole>,
    pub channels: Vec<GuildChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildRole {
    pub id: String,
    pub name: String,
    /// Hex color like `#1abc9c`.
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildChannel {
    pub id: String,
    pub name: String,
    /// Channel kind, like `text` or `voice`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Looks up servers the bot has joined.
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    /// Get a server by id, or `None` if the bot is not a member of it.
    async fn guild(&self, id: &str) -> Result<Option<Guild>>;

    /// Test if the user is a member of the server with administrator
    /// permissions.
    async fn is_administrator(&self, server: &str, user: &str) -> Result<bool>;
}
