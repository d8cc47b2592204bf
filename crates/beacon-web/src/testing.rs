//! Fixtures shared by the endpoint tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use api::{Account, LiveSource, LiveStatus};
use async_trait::async_trait;
use chrono::Utc;
use common::{MemoryStore, NewSubscription, NotificationContent, NotificationSink, Platform};
use common::{Guild, GuildChannel, GuildDirectory, GuildRole, SinkError, SubscriptionStore};
use engine::{Admin, Proposals, PushScheduler, Reconciler, Sources};

use crate::Web;

pub(crate) const API_KEY: &str = "letmein";

/// A live platform where every account exists and nobody is live.
pub(crate) struct FakeLive {
    platform: Platform,
    fetches: AtomicUsize,
}

impl FakeLive {
    fn new(platform: Platform) -> Arc<Self> {
        Arc::new(Self {
            platform,
            fetches: AtomicUsize::new(0),
        })
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveSource for FakeLive {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_status(&self, _: &str) -> LiveStatus {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        LiveStatus::Offline(None)
    }

    async fn lookup_account(&self, name: &str) -> Result<Option<Account>> {
        if name == "nobody" {
            return Ok(None);
        }

        let name = name.trim().trim_start_matches('@');

        Ok(Some(Account {
            id: format!("id-{}", name),
            login: name.to_lowercase(),
            display_name: name.to_owned(),
            profile_image: None,
        }))
    }
}

/// Sink which accepts everything.
struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn send_message(&self, _: &str, _: &NotificationContent) -> Result<String, SinkError> {
        Ok("1".to_owned())
    }

    async fn edit_message(
        &self,
        _: &str,
        _: &str,
        _: &NotificationContent,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    async fn delete_message(&self, _: &str, _: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A directory which only knows server `1`, administered by user `7`.
pub(crate) struct FakeGuilds;

#[async_trait]
impl GuildDirectory for FakeGuilds {
    async fn guild(&self, id: &str) -> Result<Option<Guild>> {
        if id != "1" {
            return Ok(None);
        }

        Ok(Some(Guild {
            id: "1".to_owned(),
            name: "Stream Team".to_owned(),
            icon: None,
            owner_id: "7".to_owned(),
            member_count: Some(42),
            roles: vec![GuildRole {
                id: "10".to_owned(),
                name: "Mods".to_owned(),
                color: "#1abc9c".to_owned(),
            }],
            channels: vec![GuildChannel {
                id: "100".to_owned(),
                name: "live".to_owned(),
                kind: "text".to_owned(),
            }],
        }))
    }

    async fn is_administrator(&self, server: &str, user: &str) -> Result<bool> {
        Ok(server == "1" && user == "7")
    }
}

pub(crate) struct Fixture {
    pub(crate) web: Web,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) twitch: Arc<FakeLive>,
    pub(crate) kick: Arc<FakeLive>,
}

impl Fixture {
    /// Insert a subscription following the account.
    pub(crate) async fn follow(&self, platform: Platform, account: &str) -> String {
        let draft = NewSubscription {
            platform,
            account: account.to_owned(),
            display_name: account.to_owned(),
            server_id: "1".to_owned(),
            channel_id: "100".to_owned(),
            added_by: "7".to_owned(),
            message: None,
            mention: None,
            keep_vod: false,
            social_links: false,
            social_link_url: None,
        };

        let id = format!("{}-{}", platform.as_str(), account);
        let s = draft.normalized().into_subscription(id.clone(), Utc::now());
        self.store.insert(&s).await.unwrap();
        id
    }
}

/// Set up endpoints over an in-memory store with Twitch and Kick enabled.
pub(crate) fn setup() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let twitch = FakeLive::new(Platform::Twitch);
    let kick = FakeLive::new(Platform::Kick);

    let sources = Sources::new()
        .with_live(twitch.clone())
        .with_live(kick.clone());

    let reconciler = Reconciler::new(store.clone(), Arc::new(NullSink), sources);
    let admin = Admin::new(reconciler.clone(), Proposals::new(Duration::from_secs(60)));
    let push = PushScheduler::new(reconciler, Duration::from_secs(5));

    Fixture {
        web: Web::new(admin, push),
        store,
        twitch,
        kick,
    }
}
