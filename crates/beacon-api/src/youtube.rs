//! YouTube Data API v3 client.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Platform, PtDuration};
use reqwest::{header, Client, Method, Url};
use serde::Deserialize;

use crate::{Account, Content, FeedSource, FeedStatus, LiveSource, LiveStatus, LiveStream};
use crate::{RequestBuilder, Vod};

const V3_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Playlist prefix listing the long form uploads of a channel.
const UPLOADS_LONG: &str = "UULF";
/// Playlist prefix listing the shorts of a channel.
const UPLOADS_SHORTS: &str = "UUSH";

/// API integration.
#[derive(Clone)]
pub struct YouTube {
    client: Client,
    v3_url: Url,
    api_key: Arc<str>,
}

impl YouTube {
    /// Create a new API integration.
    pub fn new(client: Client, api_key: &str) -> Result<Self> {
        Ok(Self {
            client,
            v3_url: str::parse::<Url>(V3_URL)?,
            api_key: api_key.into(),
        })
    }

    /// Build request against v3 URL.
    fn v3(&self, method: Method, path: &[&str]) -> RequestBuilder {
        let mut url = self.v3_url.clone();

        if let Ok(mut p) = url.path_segments_mut() {
            p.extend(path);
        }

        RequestBuilder::new(self.client.clone(), method, url)
            .header(header::ACCEPT, "application/json")
            .query_param("key", &self.api_key)
    }

    /// Get a channel by its handle, with or without the leading `@`.
    pub async fn channel_by_handle(&self, handle: &str) -> Result<Option<Channel>> {
        let handle = format!("@{}", handle.trim_start_matches('@'));

        let req = self
            .v3(Method::GET, &["channels"])
            .query_param("part", "snippet")
            .query_param("forHandle", &handle);

        let res = req.execute().await?.json::<Page<Channel>>()?;
        Ok(res.items.into_iter().next())
    }

    /// Get a channel by its id.
    pub async fn channel_by_id(&self, id: &str) -> Result<Option<Channel>> {
        let req = self
            .v3(Method::GET, &["channels"])
            .query_param("part", "snippet")
            .query_param("id", id);

        let res = req.execute().await?.json::<Page<Channel>>()?;
        Ok(res.items.into_iter().next())
    }

    /// Resolve a channel by either its id or its handle.
    pub async fn channel(&self, name: &str) -> Result<Option<Channel>> {
        let name = name.trim();

        if is_channel_id(name) {
            return self.channel_by_id(name).await;
        }

        self.channel_by_handle(name).await
    }

    /// Search for the most recent broadcast of a channel with the given
    /// event type, like `live` or `completed`.
    pub async fn search_broadcast(&self, channel_id: &str, event_type: &str) -> Result<Option<String>> {
        let req = self
            .v3(Method::GET, &["search"])
            .query_param("part", "id")
            .query_param("channelId", channel_id)
            .query_param("eventType", event_type)
            .query_param("type", "video")
            .query_param("order", "date")
            .query_param("maxResults", "1");

        let res = req.execute().await?.json::<Page<SearchResult>>()?;
        Ok(res.items.into_iter().find_map(|r| r.id.video_id))
    }

    /// Get the most recent video of a playlist.
    ///
    /// Playlists which do not exist are treated as empty.
    pub async fn latest_in_playlist(&self, playlist_id: &str) -> Result<Option<String>> {
        let req = self
            .v3(Method::GET, &["playlistItems"])
            .query_param("part", "contentDetails")
            .query_param("playlistId", playlist_id)
            .query_param("maxResults", "1");

        let res = req.execute().await?.not_found().json::<Page<PlaylistItem>>()?;

        Ok(res
            .and_then(|p| p.items.into_iter().next())
            .map(|item| item.content_details.video_id))
    }

    /// Get a video by id.
    pub async fn video(&self, video_id: &str, part: &str) -> Result<Option<Video>> {
        let req = self
            .v3(Method::GET, &["videos"])
            .query_param("part", part)
            .query_param("id", video_id);

        let res = req.execute().await?.not_found().json::<Page<Video>>()?;
        Ok(res.and_then(|v| v.items.into_iter().next()))
    }

    async fn status(&self, handle: &str) -> Result<LiveStatus> {
        let Some(channel) = self.channel_by_handle(handle).await? else {
            return Ok(LiveStatus::NotFound);
        };

        if let Some(id) = self.search_broadcast(&channel.id, "live").await? {
            if let Some(video) = self
                .video(&id, "snippet,liveStreamingDetails,statistics")
                .await?
            {
                let details = video.live_streaming_details.unwrap_or_default();
                let snippet = video.snippet.unwrap_or_default();

                return Ok(LiveStatus::Live(LiveStream {
                    url: watch_url(&video.id),
                    stream_id: video.id,
                    display_name: channel.snippet.title.clone(),
                    title: snippet.title,
                    viewers: details
                        .concurrent_viewers
                        .as_deref()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or_default(),
                    started_at: details.actual_start_time,
                    thumbnail: snippet.thumbnails.best(),
                    category: None,
                    profile_image: channel.snippet.thumbnails.best(),
                }));
            }
        }

        let Some(id) = self.search_broadcast(&channel.id, "completed").await? else {
            return Ok(LiveStatus::Offline(None));
        };

        let vod = self.video(&id, "snippet,contentDetails").await?.map(|video| {
            let snippet = video.snippet.unwrap_or_default();

            Vod {
                url: watch_url(&video.id),
                id: video.id,
                title: snippet.title,
                duration: video
                    .content_details
                    .and_then(|d| d.duration)
                    .map(PtDuration::into_std),
                thumbnail: snippet.thumbnails.best(),
            }
        });

        Ok(LiveStatus::Offline(vod))
    }
}

#[async_trait]
impl LiveSource for YouTube {
    fn platform(&self) -> Platform {
        Platform::YoutubeLive
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_status(&self, account: &str) -> LiveStatus {
        LiveStatus::from_result(self.status(account).await)
    }

    async fn lookup_account(&self, name: &str) -> Result<Option<Account>> {
        Ok(self.channel(name).await?.map(|c| c.into_account(name)))
    }
}

/// The uploads of a channel, either long form videos or shorts.
#[derive(Clone)]
pub struct YouTubeFeed {
    youtube: YouTube,
    shorts: bool,
}

impl YouTubeFeed {
    /// Feed of long form uploads.
    pub fn latest(youtube: YouTube) -> Self {
        Self {
            youtube,
            shorts: false,
        }
    }

    /// Feed of shorts.
    pub fn shorts(youtube: YouTube) -> Self {
        Self {
            youtube,
            shorts: true,
        }
    }

    async fn latest_content(&self, channel_id: &str) -> Result<FeedStatus> {
        let Some(playlist_id) = uploads_playlist(channel_id, self.shorts) else {
            return Ok(FeedStatus::NotFound);
        };

        let Some(video_id) = self.youtube.latest_in_playlist(&playlist_id).await? else {
            return Ok(FeedStatus::NotFound);
        };

        let Some(video) = self
            .youtube
            .video(&video_id, "snippet,statistics,contentDetails")
            .await?
        else {
            return Ok(FeedStatus::NotFound);
        };

        let snippet = video.snippet.unwrap_or_default();

        let url = if self.shorts {
            format!("https://www.youtube.com/shorts/{}", video.id)
        } else {
            watch_url(&video.id)
        };

        Ok(FeedStatus::Latest(Content {
            id: video.id,
            url,
            title: snippet.title,
            author: snippet.channel_title,
            published_at: snippet.published_at,
            thumbnail: snippet.thumbnails.best(),
            views: video
                .statistics
                .and_then(|s| s.view_count)
                .and_then(|v| v.parse().ok()),
            duration: video
                .content_details
                .and_then(|d| d.duration)
                .map(PtDuration::into_std),
            profile_image: None,
        }))
    }
}

#[async_trait]
impl FeedSource for YouTubeFeed {
    fn platform(&self) -> Platform {
        if self.shorts {
            Platform::YoutubeShort
        } else {
            Platform::YoutubeLatest
        }
    }

    #[tracing::instrument(skip(self), fields(shorts = self.shorts))]
    async fn fetch_latest(&self, channel_id: &str) -> FeedStatus {
        FeedStatus::from_result(self.latest_content(channel_id).await)
    }

    async fn lookup_account(&self, name: &str) -> Result<Option<Account>> {
        Ok(self.youtube.channel(name).await?.map(|c| c.into_account(name)))
    }
}

fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

fn is_channel_id(name: &str) -> bool {
    name.len() == 24 && name.starts_with("UC")
}

/// Derive the uploads playlist of a channel.
fn uploads_playlist(channel_id: &str, shorts: bool) -> Option<String> {
    let rest = channel_id.strip_prefix("UC")?;
    let prefix = if shorts { UPLOADS_SHORTS } else { UPLOADS_LONG };
    Some(format!("{}{}", prefix, rest))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnails {
    #[serde(default)]
    pub default: Option<Thumbnail>,
    #[serde(default)]
    pub medium: Option<Thumbnail>,
    #[serde(default)]
    pub high: Option<Thumbnail>,
    #[serde(default)]
    pub standard: Option<Thumbnail>,
    #[serde(default)]
    pub maxres: Option<Thumbnail>,
}

impl Thumbnails {
    /// The largest available thumbnail.
    pub fn best(&self) -> Option<String> {
        [
            &self.maxres,
            &self.standard,
            &self.high,
            &self.medium,
            &self.default,
        ]
        .into_iter()
        .flatten()
        .map(|t| t.url.clone())
        .next()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub snippet: ChannelSnippet,
}

impl Channel {
    fn into_account(self, requested: &str) -> Account {
        let login = match &self.snippet.custom_url {
            Some(custom) => common::normalize_account(Platform::YoutubeLive, custom),
            None => common::normalize_account(Platform::YoutubeLive, requested),
        };

        Account {
            profile_image: self.snippet.thumbnails.best(),
            id: self.id,
            login,
            display_name: self.snippet.title,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub custom_url: Option<String>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchId {
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub id: SearchId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemDetails {
    pub video_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub content_details: PlaylistItemDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(default)]
    pub view_count: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDetails {
    #[serde(default)]
    pub duration: Option<PtDuration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamingDetails {
    #[serde(default)]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub concurrent_viewers: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<Snippet>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
    #[serde(default)]
    pub content_details: Option<ContentDetails>,
    #[serde(default)]
    pub live_streaming_details: Option<LiveStreamingDetails>,
}
