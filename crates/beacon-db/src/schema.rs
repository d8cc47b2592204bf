//! Every platform has its own table with identical columns.

macro_rules! subscription_tables {
    ($($name:ident),* $(,)?) => {
        $(
            diesel::table! {
                $name (id) {
                    id -> Text,
                    account -> Text,
                    display_name -> Text,
                    server_id -> Text,
                    channel_id -> Text,
                    added_by -> Text,
                    message -> Nullable<Text>,
                    mention -> Nullable<Text>,
                    keep_vod -> Bool,
                    social_links -> Bool,
                    social_link_url -> Nullable<Text>,
                    message_id -> Nullable<Text>,
                    terminal_id -> Nullable<Text>,
                    event_subscription -> Nullable<Text>,
                    created_at -> Timestamp,
                }
            }
        )*
    };
}

subscription_tables! {
    twitch_subscriptions,
    kick_subscriptions,
    youtube_live_subscriptions,
    youtube_latest_subscriptions,
    youtube_short_subscriptions,
}
