//! Clients for the platforms beacon follows.
//!
//! Each platform is normalized into either a [`LiveSource`] or a
//! [`FeedSource`], so the reconciler never needs to know which platform it
//! talks to.

mod base;
pub use self::base::{RequestBuilder, Response, USER_AGENT};

pub mod kick;
pub use self::kick::Kick;

mod status;
pub use self::status::{
    Account, Content, FeedSource, FeedStatus, LiveSource, LiveStatus, LiveStream, Vod,
};

pub mod token;
pub use self::token::{AccessToken, ClientCredentials, TokenManager, TokenPayload};

pub mod twitch;
pub use self::twitch::Twitch;

pub mod youtube;
pub use self::youtube::{YouTube, YouTubeFeed};

use std::time::Duration;

/// Bound on every outbound request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Construct the HTTP client shared by the platform clients.
pub fn client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?)
}
