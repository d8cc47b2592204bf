//! Turn platform state into notification content.

use api::{Content, LiveStream, Vod};
use common::display;
use common::{Embed, NotificationContent, Platform, Subscription};

const TWITCH_COLOR: u32 = 0xa970ff;
const KICK_COLOR: u32 = 0x53fc18;
const YOUTUBE_COLOR: u32 = 0xff0033;

/// Accent colour of a platform.
pub fn color(platform: Platform) -> u32 {
    match platform {
        Platform::Twitch => TWITCH_COLOR,
        Platform::Kick => KICK_COLOR,
        Platform::YoutubeLive | Platform::YoutubeLatest | Platform::YoutubeShort => YOUTUBE_COLOR,
    }
}

/// Render the mention of a subscription.
///
/// A mention equal to the server id addresses everyone, since that is the id
/// of the `@everyone` role.
pub fn mention(subscription: &Subscription) -> Option<String> {
    let mention = subscription.mention.as_deref()?.trim();

    let mention = match mention {
        "" => return None,
        "here" | "@here" => "@here".to_owned(),
        "everyone" | "@everyone" => "@everyone".to_owned(),
        id if id == subscription.server_id => "@everyone".to_owned(),
        id => format!("<@&{}>", id.trim_start_matches("<@&").trim_end_matches('>')),
    };

    Some(mention)
}

/// Plain text part of a notification: the mention followed by the custom
/// message.
fn text(subscription: &Subscription) -> Option<String> {
    let parts = [
        mention(subscription),
        subscription
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_owned),
    ];

    let parts = parts.into_iter().flatten().collect::<Vec<_>>();

    if parts.is_empty() {
        return None;
    }

    Some(parts.join(" "))
}

fn social_links(mut content: NotificationContent, subscription: &Subscription) -> NotificationContent {
    if subscription.social_links {
        if let Some(url) = &subscription.social_link_url {
            content = content.button("Social Links", url.as_str());
        }
    }

    content
}

fn display_name<'a>(subscription: &'a Subscription, reported: &'a str) -> &'a str {
    if reported.trim().is_empty() {
        &subscription.display_name
    } else {
        reported
    }
}

/// Notification for an ongoing broadcast.
pub fn live(subscription: &Subscription, stream: &LiveStream) -> NotificationContent {
    let name = display_name(subscription, &stream.display_name);

    let mut embed = Embed {
        title: Some(stream.title.clone()).filter(|t| !t.is_empty()),
        url: Some(stream.url.clone()),
        color: color(subscription.platform),
        author: Some(format!("{} is now live on {}!", name, subscription.platform.title())),
        author_icon: stream.profile_image.clone(),
        image: stream.thumbnail.clone(),
        timestamp: stream.started_at,
        footer: Some(subscription.platform.title().to_owned()),
        ..Embed::default()
    };

    if let Some(category) = &stream.category {
        embed = embed.field("Category", category.as_str(), true);
    }

    embed = embed.field("Viewers", display::viewers(stream.viewers), true);

    if let Some(started_at) = &stream.started_at {
        embed = embed.field("Live Since", display::relative_timestamp(started_at), true);
    }

    let content = NotificationContent {
        content: text(subscription),
        embed,
        buttons: Vec::new(),
    }
    .button("Watch Stream", stream.url.as_str());

    social_links(content, subscription)
}

/// Notification for a broadcast which ended and was archived.
pub fn archived(subscription: &Subscription, vod: &Vod) -> NotificationContent {
    let mut embed = Embed {
        title: Some(vod.title.clone()).filter(|t| !t.is_empty()),
        url: Some(vod.url.clone()),
        color: color(subscription.platform),
        author: Some(format!("{} is offline", subscription.display_name)),
        image: vod.thumbnail.clone(),
        footer: Some(subscription.platform.title().to_owned()),
        ..Embed::default()
    };

    if let Some(duration) = vod.duration {
        embed = embed.field("VOD Duration", display::compact_duration(duration), true);
    }

    let content = NotificationContent {
        content: text(subscription),
        embed,
        buttons: Vec::new(),
    }
    .button("Watch VOD", vod.url.as_str());

    social_links(content, subscription)
}

/// Notification for newly published content.
pub fn content(subscription: &Subscription, content: &Content) -> NotificationContent {
    let short = subscription.platform == Platform::YoutubeShort;
    let name = display_name(subscription, &content.author);

    let author = if short {
        format!("{} posted a new short!", name)
    } else {
        format!("{} posted a new video!", name)
    };

    let mut embed = Embed {
        title: Some(content.title.clone()).filter(|t| !t.is_empty()),
        url: Some(content.url.clone()),
        color: color(subscription.platform),
        author: Some(author),
        author_icon: content.profile_image.clone(),
        image: content.thumbnail.clone(),
        timestamp: content.published_at,
        footer: Some(subscription.platform.title().to_owned()),
        ..Embed::default()
    };

    if let Some(views) = content.views {
        embed = embed.field("Views", display::viewers(views), true);
    }

    if let Some(duration) = content.duration {
        embed = embed.field("Duration", display::compact_duration(duration), true);
    }

    if let Some(published_at) = &content.published_at {
        embed = embed.field("Published", display::relative_timestamp(published_at), true);
    }

    let label = if short { "Watch Short" } else { "Watch Video" };

    let out = NotificationContent {
        content: text(subscription),
        embed,
        buttons: Vec::new(),
    }
    .button(label, content.url.as_str());

    social_links(out, subscription)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_mention() {
        let mut sub = testing::subscription("a", Platform::Twitch, "alice");
        assert_eq!(mention(&sub), None);

        sub.mention = Some(sub.server_id.clone());
        assert_eq!(mention(&sub).as_deref(), Some("@everyone"));

        sub.mention = Some("here".into());
        assert_eq!(mention(&sub).as_deref(), Some("@here"));

        sub.mention = Some("123456".into());
        assert_eq!(mention(&sub).as_deref(), Some("<@&123456>"));

        sub.mention = Some("<@&123456>".into());
        assert_eq!(mention(&sub).as_deref(), Some("<@&123456>"));
    }

    #[test]
    fn test_live() {
        let mut sub = testing::subscription("a", Platform::Twitch, "alice");
        sub.message = Some("Come hang out".into());
        sub.mention = Some("here".into());
        sub.social_links = true;
        sub.social_link_url = Some("https://links.example/alice".into());

        let out = live(&sub, &testing::stream("s123"));
        assert_eq!(out.content.as_deref(), Some("@here Come hang out"));
        assert_eq!(out.embed.color, 0xa970ff);
        assert_eq!(out.embed.author.as_deref(), Some("Alice is now live on Twitch!"));
        assert!(out.embed.fields.iter().any(|f| f.name == "Viewers" && f.value == "1.2K"));
        assert_eq!(
            out.buttons.iter().map(|b| b.label.as_str()).collect::<Vec<_>>(),
            ["Watch Stream", "Social Links"]
        );
    }

    #[test]
    fn test_archived() {
        let sub = testing::subscription("a", Platform::Twitch, "alice");
        let out = archived(&sub, &testing::vod("s123"));
        assert_eq!(out.embed.author.as_deref(), Some("alice is offline"));
        assert!(out.embed.fields.iter().any(|f| f.name == "VOD Duration" && f.value == "1h2m3s"));
        assert_eq!(out.buttons[0].label, "Watch VOD");
    }

    #[test]
    fn test_short() {
        let sub = testing::subscription("a", Platform::YoutubeShort, "UCabc");
        let out = content(&sub, &testing::content("v1"));
        assert_eq!(out.embed.author.as_deref(), Some("Creator posted a new short!"));
        assert_eq!(out.buttons[0].label, "Watch Short");
        assert_eq!(out.embed.color, 0xff0033);
    }
}
