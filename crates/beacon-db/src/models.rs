use chrono::{NaiveDateTime, TimeZone as _, Utc};
use common::{Platform, RuntimeState, Subscription};
use diesel::Queryable;

/// A row in any of the subscription tables.
#[derive(Debug, Clone, Queryable)]
pub(crate) struct Row {
    pub(crate) id: String,
    pub(crate) account: String,
    pub(crate) display_name: String,
    pub(crate) server_id: String,
    pub(crate) channel_id: String,
    pub(crate) added_by: String,
    pub(crate) message: Option<String>,
    pub(crate) mention: Option<String>,
    pub(crate) keep_vod: bool,
    pub(crate) social_links: bool,
    pub(crate) social_link_url: Option<String>,
    pub(crate) message_id: Option<String>,
    pub(crate) terminal_id: Option<String>,
    pub(crate) event_subscription: Option<String>,
    pub(crate) created_at: NaiveDateTime,
}

impl Row {
    pub(crate) fn into_subscription(self, platform: Platform) -> Subscription {
        Subscription {
            id: self.id,
            platform,
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
            state: RuntimeState {
                message_id: self.message_id,
                terminal_id: self.terminal_id,
            },
            event_subscription: self.event_subscription,
            created_at: Utc.from_utc_datetime(&self.created_at),
        }
    }
}
