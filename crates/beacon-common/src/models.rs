use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A platform a subscription follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Twitch,
    Kick,
    YoutubeLive,
    YoutubeLatest,
    YoutubeShort,
}

/// How a platform is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    /// Tracks a live stream with a single message per broadcast.
    Live,
    /// Announces each new piece of content once.
    Feed,
}

impl Platform {
    /// All supported platforms.
    pub const ALL: [Platform; 5] = [
        Platform::Twitch,
        Platform::Kick,
        Platform::YoutubeLive,
        Platform::YoutubeLatest,
        Platform::YoutubeShort,
    ];

    /// Stable identifier of the platform.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::Kick => "kick",
            Platform::YoutubeLive => "youtube_live",
            Platform::YoutubeLatest => "youtube_latest",
            Platform::YoutubeShort => "youtube_short",
        }
    }

    /// Human readable name of the platform.
    pub fn title(self) -> &'static str {
        match self {
            Platform::Twitch => "Twitch",
            Platform::Kick => "Kick",
            Platform::YoutubeLive => "YouTube",
            Platform::YoutubeLatest => "YouTube",
            Platform::YoutubeShort => "YouTube Shorts",
        }
    }

    pub fn kind(self) -> PlatformKind {
        match self {
            Platform::Twitch | Platform::Kick | Platform::YoutubeLive => PlatformKind::Live,
            Platform::YoutubeLatest | Platform::YoutubeShort => PlatformKind::Feed,
        }
    }

    /// Test if the platform can keep an archived VOD message around after a
    /// broadcast ended.
    pub fn supports_keep_vod(self) -> bool {
        matches!(self, Platform::Twitch | Platform::YoutubeLive)
    }

    /// Test if accounts on this platform are addressed by an opaque channel
    /// id rather than a case-insensitive name.
    pub fn uses_channel_id(self) -> bool {
        matches!(self, Platform::YoutubeLatest | Platform::YoutubeShort)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Error)]
#[error("unsupported platform `{0}`")]
pub struct UnknownPlatform(String);

impl std::str::FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().replace('-', "_").as_str() {
            "twitch" => Platform::Twitch,
            "kick" => Platform::Kick,
            "youtube_live" | "youtube" => Platform::YoutubeLive,
            "youtube_latest" => Platform::YoutubeLatest,
            "youtube_short" | "youtube_shorts" => Platform::YoutubeShort,
            _ => return Err(UnknownPlatform(s.to_owned())),
        })
    }
}

/// Normalize an account identifier the way it is stored and queried.
///
/// Names are trimmed, stripped of a leading `@` and lowercased. Channel ids
/// are case sensitive and only trimmed.
pub fn normalize_account(platform: Platform, account: &str) -> String {
    let account = account.trim();

    if platform.uses_channel_id() {
        return account.to_owned();
    }

    account.trim_start_matches('@').to_lowercase()
}

/// The runtime state the reconciler tracks for a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeState {
    /// The currently posted message, if any.
    pub message_id: Option<String>,
    /// The last seen stream, VOD or video id.
    pub terminal_id: Option<String>,
}

impl RuntimeState {
    /// State where nothing is tracked.
    pub const EMPTY: RuntimeState = RuntimeState {
        message_id: None,
        terminal_id: None,
    };

    pub fn new(message_id: Option<String>, terminal_id: Option<String>) -> Self {
        Self {
            message_id,
            terminal_id,
        }
    }
}

/// A persisted notification rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub platform: Platform,
    /// The normalized identifier queried on the platform.
    pub account: String,
    /// The name shown in notifications.
    pub display_name: String,
    pub server_id: String,
    pub channel_id: String,
    /// Discord user who confirmed the subscription.
    pub added_by: String,
    pub message: Option<String>,
    pub mention: Option<String>,
    pub keep_vod: bool,
    pub social_links: bool,
    pub social_link_url: Option<String>,
    #[serde(flatten)]
    pub state: RuntimeState,
    /// Handle of the platform side push subscription.
    pub event_subscription: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The fields of a subscription before it has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub platform: Platform,
    pub account: String,
    pub display_name: String,
    pub server_id: String,
    pub channel_id: String,
    pub added_by: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub mention: Option<String>,
    #[serde(default)]
    pub keep_vod: bool,
    #[serde(default)]
    pub social_links: bool,
    #[serde(default)]
    pub social_link_url: Option<String>,
}

impl NewSubscription {
    /// Apply normalization rules to the draft.
    pub fn normalized(mut self) -> Self {
        self.account = normalize_account(self.platform, &self.account);
        self.keep_vod = self.keep_vod && self.platform.supports_keep_vod();
        self.message = self.message.filter(|m| !m.trim().is_empty());
        self.mention = self.mention.filter(|m| !m.trim().is_empty());
        self.social_link_url = self.social_link_url.filter(|m| !m.trim().is_empty());
        self
    }

    /// Convert into a subscription with a fresh runtime state.
    pub fn into_subscription(self, id: String, created_at: DateTime<Utc>) -> Subscription {
        Subscription {
            id,
            platform: self.platform,
            account: self.account,
            display_name: self.display_name,
            server_id: self.server_id,
            channel_id: self.channel_id,
            added_by: self.added_by,
            message: self.message,
            mention: self.mention,
            keep_vod: self.keep_vod,
            social_links: self.social_links,
            social_link_url: self.social_link_url,
            state: RuntimeState::EMPTY,
            event_subscription: None,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_account() {
        assert_eq!(normalize_account(Platform::Twitch, " @Foo "), "foo");
        assert_eq!(normalize_account(Platform::Kick, "XQC"), "xqc");
        assert_eq!(normalize_account(Platform::YoutubeLive, "@LinusTechTips"), "linustechtips");
        assert_eq!(
            normalize_account(Platform::YoutubeLatest, " UCXuqSBlHAE6Xw-yeJA0Tunw "),
            "UCXuqSBlHAE6Xw-yeJA0Tunw"
        );
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("twitch".parse::<Platform>().unwrap(), Platform::Twitch);
        assert_eq!("YouTube-Live".parse::<Platform>().unwrap(), Platform::YoutubeLive);
        assert_eq!("youtube_short".parse::<Platform>().unwrap(), Platform::YoutubeShort);
        assert!("mixer".parse::<Platform>().is_err());

        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn test_keep_vod_forced_off_for_unsupported() {
        let draft = NewSubscription {
            platform: Platform::Kick,
            account: "@Alice".into(),
            display_name: "Alice".into(),
            server_id: "1".into(),
            channel_id: "2".into(),
            added_by: "3".into(),
            message: Some("  ".into()),
            mention: None,
            keep_vod: true,
            social_links: false,
            social_link_url: None,
        }
        .normalized();

        assert_eq!(draft.account, "alice");
        assert!(!draft.keep_vod);
        assert_eq!(draft.message, None);
    }
}
