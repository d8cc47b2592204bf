//! Kick public API client.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use common::Platform;
use reqwest::{header, Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::token::{ClientCredentials, CredentialStyle, TokenManager};
use crate::{Account, LiveSource, LiveStatus, LiveStream, RequestBuilder};

const API_KICK_URL: &str = "https://api.kick.com/public/v1";
const ID_KICK_URL: &str = "https://id.kick.com/oauth/token";
pub const LIVESTREAM_STATUS_UPDATED: &str = "livestream.status.updated";

/// Kick API client.
#[derive(Clone, Debug)]
pub struct Kick {
    client: Client,
    api_url: Url,
    token: TokenManager,
    webhooks: bool,
}

impl Kick {
    /// Create a new Kick API client.
    ///
    /// `webhooks` controls whether event subscriptions are created.
    pub fn new(client: Client, token: TokenManager, webhooks: bool) -> Result<Self> {
        Ok(Self {
            client,
            api_url: str::parse::<Url>(API_KICK_URL)?,
            token,
            webhooks,
        })
    }

    /// Construct the app token manager for Kick.
    pub fn token_manager(
        client: Client,
        client_id: String,
        client_secret: String,
        path: Option<std::path::PathBuf>,
    ) -> Result<TokenManager> {
        let source = ClientCredentials::new(
            client,
            str::parse::<Url>(ID_KICK_URL)?,
            client_id.clone(),
            client_secret,
            CredentialStyle::Form,
        );

        Ok(TokenManager::new("kick", client_id, source, path))
    }

    fn public(&self, method: Method, path: &[&str]) -> RequestBuilder {
        let mut url = self.api_url.clone();

        if let Ok(mut p) = url.path_segments_mut() {
            p.extend(path);
        }

        RequestBuilder::new(self.client.clone(), method, url)
            .token(self.token.clone())
            .header(header::ACCEPT, "application/json")
    }

    /// Get a channel by its slug.
    pub async fn channel_by_slug(&self, slug: &str) -> Result<Option<Channel>> {
        let req = self.public(Method::GET, &["channels"]).query_param("slug", slug);

        let res = req
            .execute()
            .await?
            .not_found()
            .json::<Data<Vec<Channel>>>()?;

        Ok(res.and_then(|d| d.data.into_iter().next()))
    }

    /// Get a user by id.
    pub async fn user_by_id(&self, id: u64) -> Result<Option<User>> {
        let req = self
            .public(Method::GET, &["users"])
            .query_param("id", &id.to_string());

        let res = req
            .execute()
            .await?
            .not_found()
            .json::<Data<Vec<User>>>()?;

        Ok(res.and_then(|d| d.data.into_iter().next()))
    }

    /// Subscribe to live status updates of a broadcaster.
    pub async fn create_subscription(&self, broadcaster_user_id: u64) -> Result<Option<String>> {
        let body = CreateSubscription {
            broadcaster_user_id,
            events: [Event {
                name: LIVESTREAM_STATUS_UPDATED,
                version: 1,
            }],
            method: "webhook",
        };

        let res = self
            .public(Method::POST, &["events", "subscriptions"])
            .json_body(&body)?
            .execute()
            .await?
            .empty_on_status(StatusCode::CONFLICT)
            .json::<Data<Vec<CreatedSubscription>>>()?;

        let Some(created) = res.and_then(|d| d.data.into_iter().next()) else {
            return Ok(None);
        };

        if let Some(error) = created.error.filter(|e| !e.is_empty()) {
            anyhow::bail!("subscription rejected: {}", error);
        }

        Ok(created.subscription_id)
    }

    /// Delete an event subscription.
    pub async fn delete_subscription(&self, id: &str) -> Result<()> {
        let res = self
            .public(Method::DELETE, &["events", "subscriptions"])
            .query_param("id", id)
            .execute()
            .await?;

        if res.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        res.ok()
    }

    async fn status(&self, slug: &str) -> Result<LiveStatus> {
        let Some(channel) = self.channel_by_slug(slug).await? else {
            return Ok(LiveStatus::NotFound);
        };

        let stream = match channel.stream {
            Some(stream) if stream.is_live => stream,
            _ => return Ok(LiveStatus::Offline(None)),
        };

        let stream_id = stream
            .start_time
            .clone()
            .context("live stream without start time")?;

        Ok(LiveStatus::Live(LiveStream {
            stream_id,
            display_name: channel.slug.clone(),
            title: channel.stream_title,
            viewers: stream.viewer_count,
            started_at: stream
                .start_time
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&chrono::Utc)),
            thumbnail: stream.thumbnail.filter(|t| !t.is_empty()),
            category: channel.category.map(|c| c.name),
            profile_image: None,
            url: format!("https://kick.com/{}", channel.slug),
        }))
    }
}

#[async_trait]
impl LiveSource for Kick {
    fn platform(&self) -> Platform {
        Platform::Kick
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_status(&self, account: &str) -> LiveStatus {
        LiveStatus::from_result(self.status(account).await)
    }

    async fn lookup_account(&self, name: &str) -> Result<Option<Account>> {
        let slug = common::normalize_account(Platform::Kick, name);

        let Some(channel) = self.channel_by_slug(&slug).await? else {
            return Ok(None);
        };

        let user = self.user_by_id(channel.broadcaster_user_id).await?;

        Ok(Some(Account {
            id: channel.broadcaster_user_id.to_string(),
            display_name: user
                .as_ref()
                .map(|u| u.name.clone())
                .unwrap_or_else(|| channel.slug.clone()),
            login: channel.slug,
            profile_image: user.and_then(|u| u.profile_picture),
        }))
    }

    async fn event_subscribe(&self, account: &str) -> Option<String> {
        if !self.webhooks {
            return None;
        }

        let result = async {
            let channel = self
                .channel_by_slug(account)
                .await?
                .with_context(|| format!("no such channel: {}", account))?;

            self.create_subscription(channel.broadcaster_user_id).await
        };

        match result.await {
            Ok(id) => {
                tracing::info!(account, ?id, "Subscribed to {}", LIVESTREAM_STATUS_UPDATED);
                id
            }
            Err(e) => {
                common::log_warn!(e, "{}: failed to subscribe to {}", account, LIVESTREAM_STATUS_UPDATED);
                None
            }
        }
    }

    async fn event_unsubscribe(&self, account: &str, handle: Option<&str>) -> Result<()> {
        let Some(handle) = handle else {
            tracing::debug!(account, "No event subscription to remove");
            return Ok(());
        };

        self.delete_subscription(handle).await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Data<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub broadcaster_user_id: u64,
    pub slug: String,
    #[serde(default)]
    pub stream_title: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub stream: Option<Stream>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub viewer_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub user_id: u64,
    pub name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CreatedSubscription {
    #[serde(default)]
    subscription_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct CreateSubscription<'a> {
    broadcaster_user_id: u64,
    events: [Event<'a>; 1],
    method: &'a str,
}

#[derive(Serialize)]
struct Event<'a> {
    name: &'a str,
    version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_payload() -> Result<()> {
        let body = r#"{"data":[{"banner_picture":"","broadcaster_user_id":123,
            "category":{"id":15,"name":"Just Chatting","thumbnail":""},
            "channel_description":"","slug":"alice",
            "stream":{"is_live":true,"is_mature":false,"key":"","language":"en",
            "start_time":"2025-01-01T12:00:00Z","thumbnail":"https://x/thumb.webp",
            "url":"","viewer_count":42},"stream_title":"hello"}],"message":"OK"}"#;

        let data = serde_json::from_str::<Data<Vec<Channel>>>(body)?;
        let channel = &data.data[0];
        assert_eq!(channel.broadcaster_user_id, 123);
        assert_eq!(channel.category.as_ref().map(|c| c.name.as_str()), Some("Just Chatting"));

        let stream = channel.stream.as_ref().unwrap();
        assert!(stream.is_live);
        assert_eq!(stream.start_time.as_deref(), Some("2025-01-01T12:00:00Z"));
        Ok(())
    }

    #[test]
    fn test_offline_channel_payload() -> Result<()> {
        let body = r#"{"data":[{"broadcaster_user_id":123,"slug":"alice",
            "stream":{"is_live":false,"start_time":"0001-01-01T00:00:00Z","viewer_count":0},
            "stream_title":""}]}"#;

        let data = serde_json::from_str::<Data<Vec<Channel>>>(body)?;
        assert!(!data.data[0].stream.as_ref().unwrap().is_live);
        Ok(())
    }

    #[test]
    fn test_create_subscription_body() -> Result<()> {
        let body = CreateSubscription {
            broadcaster_user_id: 123,
            events: [Event {
                name: LIVESTREAM_STATUS_UPDATED,
                version: 1,
            }],
            method: "webhook",
        };

        let value = serde_json::to_value(&body)?;
        assert_eq!(value["events"][0]["name"], "livestream.status.updated");
        assert_eq!(value["events"][0]["version"], 1);
        assert_eq!(value["method"], "webhook");
        Ok(())
    }
}
