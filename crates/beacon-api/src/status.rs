use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Platform;

/// An account resolved on a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Platform identifier, like a user id or a channel id.
    pub id: String,
    /// Name used to address the account, like a login or handle.
    pub login: String,
    pub display_name: String,
    pub profile_image: Option<String>,
}

/// An ongoing broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStream {
    /// Identifies this particular broadcast.
    pub stream_id: String,
    pub display_name: String,
    pub title: String,
    pub viewers: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
    pub category: Option<String>,
    pub profile_image: Option<String>,
    pub url: String,
}

/// The recording of the latest broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Vod {
    /// Identifier comparable to [`LiveStream::stream_id`].
    pub id: String,
    pub url: String,
    pub title: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

/// The result of asking whether an account is live.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveStatus {
    Live(LiveStream),
    Offline(Option<Vod>),
    NotFound,
    TransientError(String),
}

/// A published video.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub id: String,
    pub url: String,
    pub title: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
    pub views: Option<u64>,
    pub duration: Option<Duration>,
    pub profile_image: Option<String>,
}

/// The result of asking for the latest content of a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedStatus {
    Latest(Content),
    NotFound,
    TransientError(String),
}

impl LiveStatus {
    /// Convert a failed request into a transient error.
    pub(crate) fn from_result(result: Result<LiveStatus>) -> LiveStatus {
        match result {
            Ok(status) => status,
            Err(e) => LiveStatus::TransientError(format!("{:#}", e)),
        }
    }
}

impl FeedStatus {
    /// Convert a failed request into a transient error.
    pub(crate) fn from_result(result: Result<FeedStatus>) -> FeedStatus {
        match result {
            Ok(status) => status,
            Err(e) => FeedStatus::TransientError(format!("{:#}", e)),
        }
    }
}

/// A platform which broadcasts live streams.
#[async_trait]
pub trait LiveSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Query the current status of a normalized account.
    async fn fetch_status(&self, account: &str) -> LiveStatus;

    /// Resolve an account by the name an administrator typed.
    async fn lookup_account(&self, name: &str) -> Result<Option<Account>>;

    /// Ask the platform to push status changes for the account.
    ///
    /// Best effort: `None` means that only polling covers the account. A
    /// returned handle should be kept to unsubscribe later.
    async fn event_subscribe(&self, _account: &str) -> Option<String> {
        None
    }

    /// Cancel push notifications for the account.
    async fn event_unsubscribe(&self, _account: &str, _handle: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// A platform which publishes content.
#[async_trait]
pub trait FeedSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Query the latest published content of a channel.
    async fn fetch_latest(&self, channel_id: &str) -> FeedStatus;

    /// Resolve a channel by the name or id an administrator typed.
    async fn lookup_account(&self, name: &str) -> Result<Option<Account>>;
}
