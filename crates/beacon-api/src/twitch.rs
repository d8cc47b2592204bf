//! Twitch Helix client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Platform;
use reqwest::{header, Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::token::{ClientCredentials, CredentialStyle, TokenManager};
use crate::{Account, LiveSource, LiveStatus, LiveStream, RequestBuilder, Vod};

const API_TWITCH_URL: &str = "https://api.twitch.tv/helix";
const ID_TWITCH_URL: &str = "https://id.twitch.tv/oauth2/token";
const STREAM_ONLINE: &str = "stream.online";

/// Configuration for push notifications through EventSub.
#[derive(Debug, Clone)]
pub struct EventSubConfig {
    /// Public url of the `/twitch/callback` endpoint.
    pub callback: Url,
    /// Secret used to sign notifications.
    pub secret: String,
}

/// Twitch API client.
#[derive(Clone, Debug)]
pub struct Twitch {
    client: Client,
    api_url: Url,
    token: TokenManager,
    eventsub: Option<Arc<EventSubConfig>>,
}

impl Twitch {
    /// Create a new Twitch API client.
    pub fn new(
        client: Client,
        token: TokenManager,
        eventsub: Option<EventSubConfig>,
    ) -> Result<Self> {
        Ok(Self {
            client,
            api_url: str::parse::<Url>(API_TWITCH_URL)?,
            token,
            eventsub: eventsub.map(Arc::new),
        })
    }

    /// Construct the app token manager for Twitch.
    pub fn token_manager(
        client: Client,
        client_id: String,
        client_secret: String,
        path: Option<std::path::PathBuf>,
    ) -> Result<TokenManager> {
        let source = ClientCredentials::new(
            client,
            str::parse::<Url>(ID_TWITCH_URL)?,
            client_id.clone(),
            client_secret,
            CredentialStyle::Query,
        );

        Ok(TokenManager::new("twitch", client_id, source, path))
    }

    fn helix(&self, method: Method, path: &[&str]) -> RequestBuilder {
        let mut url = self.api_url.clone();

        if let Ok(mut p) = url.path_segments_mut() {
            p.extend(path);
        }

        RequestBuilder::new(self.client.clone(), method, url)
            .token(self.token.clone())
            .client_id_header(header::HeaderName::from_static("client-id"))
            .header(header::ACCEPT, "application/json")
    }

    /// Get information on a user.
    pub async fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        let req = self.helix(Method::GET, &["users"]).query_param("login", login);
        let res = req.execute().await?.json::<Data<Vec<User>>>()?;
        Ok(res.data.into_iter().next())
    }

    /// Get the current stream of a user.
    pub async fn stream_by_user(&self, user_id: &str) -> Result<Option<Stream>> {
        let req = self.helix(Method::GET, &["streams"]).query_param("user_id", user_id);
        let res = req.execute().await?.json::<Data<Vec<Stream>>>()?;
        Ok(res.data.into_iter().next())
    }

    /// Get the most recent archived broadcast of a user.
    pub async fn latest_archive(&self, user_id: &str) -> Result<Option<Video>> {
        let req = self
            .helix(Method::GET, &["videos"])
            .query_param("user_id", user_id)
            .query_param("type", "archive")
            .query_param("first", "1");

        let res = req.execute().await?.json::<Data<Vec<Video>>>()?;
        Ok(res.data.into_iter().next())
    }

    /// Create a `stream.online` subscription for the given user.
    ///
    /// Returns the id of the subscription, or `None` if an equivalent one
    /// already exists.
    pub async fn create_stream_online(
        &self,
        user_id: &str,
        eventsub: &EventSubConfig,
    ) -> Result<Option<String>> {
        let body = CreateSubscription {
            kind: STREAM_ONLINE,
            version: "1",
            condition: Condition {
                broadcaster_user_id: user_id,
            },
            transport: Transport {
                method: "webhook",
                callback: eventsub.callback.as_str(),
                secret: &eventsub.secret,
            },
        };

        let res = self
            .helix(Method::POST, &["eventsub", "subscriptions"])
            .json_body(&body)?
            .execute()
            .await?
            .empty_on_status(StatusCode::CONFLICT)
            .json::<Data<Vec<EventSubscription>>>()?;

        Ok(res.and_then(|d| d.data.into_iter().next()).map(|s| s.id))
    }

    /// List the EventSub subscriptions concerning the given user.
    pub async fn subscriptions_by_user(&self, user_id: &str) -> Result<Vec<EventSubscription>> {
        let req = self
            .helix(Method::GET, &["eventsub", "subscriptions"])
            .query_param("user_id", user_id);

        let res = req.execute().await?.json::<Data<Vec<EventSubscription>>>()?;
        Ok(res.data)
    }

    /// Delete an EventSub subscription.
    pub async fn delete_subscription(&self, id: &str) -> Result<()> {
        let res = self
            .helix(Method::DELETE, &["eventsub", "subscriptions"])
            .query_param("id", id)
            .execute()
            .await?;

        if res.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        res.ok()
    }

    async fn status(&self, login: &str) -> Result<LiveStatus> {
        let Some(user) = self.user_by_login(login).await? else {
            return Ok(LiveStatus::NotFound);
        };

        if let Some(stream) = self.stream_by_user(&user.id).await? {
            let thumbnail = stream
                .thumbnail_url
                .as_deref()
                .map(|url| format!("{}?t={}", sized_thumbnail(url), Utc::now().timestamp()));

            return Ok(LiveStatus::Live(LiveStream {
                stream_id: stream.id,
                display_name: user.display_name,
                title: stream.title,
                viewers: stream.viewer_count,
                started_at: stream.started_at,
                thumbnail,
                category: stream.game_name.filter(|g| !g.is_empty()),
                profile_image: user.profile_image_url,
                url: format!("https://www.twitch.tv/{}", user.login),
            }));
        }

        let vod = self.latest_archive(&user.id).await?.map(|video| Vod {
            id: video.stream_id.unwrap_or(video.id),
            url: video.url,
            title: video.title,
            duration: video.duration.as_deref().and_then(parse_duration),
            thumbnail: video.thumbnail_url.as_deref().map(sized_thumbnail),
        });

        Ok(LiveStatus::Offline(vod))
    }
}

#[async_trait]
impl LiveSource for Twitch {
    fn platform(&self) -> Platform {
        Platform::Twitch
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_status(&self, account: &str) -> LiveStatus {
        LiveStatus::from_result(self.status(account).await)
    }

    async fn lookup_account(&self, name: &str) -> Result<Option<Account>> {
        let login = common::normalize_account(Platform::Twitch, name);

        Ok(self.user_by_login(&login).await?.map(|user| Account {
            id: user.id,
            login: user.login,
            display_name: user.display_name,
            profile_image: user.profile_image_url,
        }))
    }

    async fn event_subscribe(&self, account: &str) -> Option<String> {
        let eventsub = self.eventsub.as_deref()?;

        let result = async {
            let user = self
                .user_by_login(account)
                .await?
                .with_context(|| format!("no such user: {}", account))?;

            if let Some(id) = self.create_stream_online(&user.id, eventsub).await? {
                return Ok(Some(id));
            }

            let existing = self.subscriptions_by_user(&user.id).await?;

            Ok::<_, anyhow::Error>(
                existing
                    .into_iter()
                    .find(|s| s.kind == STREAM_ONLINE)
                    .map(|s| s.id),
            )
        };

        match result.await {
            Ok(id) => {
                tracing::info!(account, ?id, "Subscribed to stream.online");
                id
            }
            Err(e) => {
                common::log_warn!(e, "{}: failed to subscribe to stream.online", account);
                None
            }
        }
    }

    async fn event_unsubscribe(&self, account: &str, _handle: Option<&str>) -> Result<()> {
        let Some(user) = self.user_by_login(account).await? else {
            return Ok(());
        };

        for subscription in self.subscriptions_by_user(&user.id).await? {
            tracing::info!(account, id = %subscription.id, "Deleting EventSub subscription");
            self.delete_subscription(&subscription.id).await?;
        }

        Ok(())
    }
}

/// Replace the size placeholders of a thumbnail template.
fn sized_thumbnail(url: &str) -> String {
    url.replace("%{width}", "1280")
        .replace("%{height}", "720")
        .replace("{width}", "1280")
        .replace("{height}", "720")
}

/// Parse a duration as reported for videos, like `3h8m33s`.
fn parse_duration(s: &str) -> Option<Duration> {
    let mut total = 0u64;
    let mut number = 0u64;

    for c in s.chars() {
        if let Some(digit) = c.to_digit(10) {
            number = number.checked_mul(10)?.checked_add(u64::from(digit))?;
            continue;
        }

        let factor = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };

        total = number.checked_mul(factor)?.checked_add(total)?;
        number = 0;
    }

    Some(Duration::from_secs(total))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Data<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stream {
    pub id: String,
    pub user_login: String,
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub id: String,
    #[serde(default)]
    pub stream_id: Option<String>,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSubscription {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Serialize)]
struct CreateSubscription<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    version: &'a str,
    condition: Condition<'a>,
    transport: Transport<'a>,
}

#[derive(Serialize)]
struct Condition<'a> {
    broadcaster_user_id: &'a str,
}

#[derive(Serialize)]
struct Transport<'a> {
    method: &'a str,
    callback: &'a str,
    secret: &'a str,
}
