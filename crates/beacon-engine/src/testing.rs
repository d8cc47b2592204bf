//! Fixtures and fakes shared by tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use api::{Account, Content, FeedSource, FeedStatus, LiveSource, LiveStatus, LiveStream, Vod};
use async_trait::async_trait;
use chrono::{TimeZone as _, Utc};
use common::{normalize_account, NotificationContent, NotificationSink, Platform, SinkError};
use common::{RuntimeState, Subscription};
use parking_lot::Mutex;

pub(crate) fn subscription(id: &str, platform: Platform, account: &str) -> Subscription {
    Subscription {
        id: id.to_owned(),
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
        state: RuntimeState::EMPTY,
        event_subscription: None,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
    }
}

pub(crate) fn stream(id: &str) -> LiveStream {
    LiveStream {
        stream_id: id.to_owned(),
        display_name: "Alice".to_owned(),
        title: "Speedrunning".to_owned(),
        viewers: 1250,
        started_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 18, 0, 0).unwrap()),
        thumbnail: Some("https://cdn.example/live.jpg".to_owned()),
        category: Some("Celeste".to_owned()),
        profile_image: None,
        url: "https://www.twitch.tv/alice".to_owned(),
    }
}

pub(crate) fn vod(id: &str) -> Vod {
    Vod {
        id: id.to_owned(),
        url: format!("https://www.twitch.tv/videos/{}", id),
        title: "Speedrunning".to_owned(),
        duration: Some(Duration::from_secs(3723)),
        thumbnail: None,
    }
}

pub(crate) fn content(id: &str) -> Content {
    Content {
        id: id.to_owned(),
        url: format!("https://www.youtube.com/watch?v={}", id),
        title: "New upload".to_owned(),
        author: "Creator".to_owned(),
        published_at: Some(Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap()),
        thumbnail: None,
        views: Some(42),
        duration: Some(Duration::from_secs(61)),
        profile_image: None,
    }
}

fn account(name: &str, id: String) -> Account {
    Account {
        id,
        login: name.trim().trim_start_matches('@').to_lowercase(),
        display_name: name.trim().trim_start_matches('@').to_owned(),
        profile_image: None,
    }
}

/// A live source with scripted statuses.
pub(crate) struct FakeLive {
    platform: Platform,
    statuses: Mutex<HashMap<String, LiveStatus>>,
    unknown: Mutex<HashSet<String>>,
    fetches: AtomicUsize,
    subscribed: Mutex<Vec<String>>,
    unsubscribed: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeLive {
    pub(crate) fn new(platform: Platform) -> Self {
        Self {
            platform,
            statuses: Mutex::new(HashMap::new()),
            unknown: Mutex::new(HashSet::new()),
            fetches: AtomicUsize::new(0),
            subscribed: Mutex::new(Vec::new()),
            unsubscribed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set(&self, account: &str, status: LiveStatus) {
        self.statuses.lock().insert(account.to_owned(), status);
    }

    /// Make account lookups for the given name fail to resolve.
    pub(crate) fn forget(&self, name: &str) {
        self.unknown
            .lock()
            .insert(normalize_account(self.platform, name));
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().clone()
    }

    pub(crate) fn unsubscribed(&self) -> Vec<(String, Option<String>)> {
        self.unsubscribed.lock().clone()
    }
}

#[async_trait]
impl LiveSource for FakeLive {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_status(&self, account: &str) -> LiveStatus {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        self.statuses
            .lock()
            .get(account)
            .cloned()
            .unwrap_or(LiveStatus::Offline(None))
    }

    async fn lookup_account(&self, name: &str) -> Result<Option<Account>> {
        let login = normalize_account(self.platform, name);

        if login == "broken" {
            return Err(anyhow!("lookup failed"));
        }

        if self.unknown.lock().contains(&login) {
            return Ok(None);
        }

        Ok(Some(account(name, format!("id-{}", login))))
    }

    async fn event_subscribe(&self, account: &str) -> Option<String> {
        self.subscribed.lock().push(account.to_owned());
        Some(format!("sub-{}", account))
    }

    async fn event_unsubscribe(&self, account: &str, handle: Option<&str>) -> Result<()> {
        self.unsubscribed
            .lock()
            .push((account.to_owned(), handle.map(str::to_owned)));
        Ok(())
    }
}

/// A feed source with scripted statuses.
pub(crate) struct FakeFeed {
    platform: Platform,
    statuses: Mutex<HashMap<String, FeedStatus>>,
}

impl FakeFeed {
    pub(crate) fn new(platform: Platform) -> Self {
        Self {
            platform,
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn set(&self, channel_id: &str, status: FeedStatus) {
        self.statuses.lock().insert(channel_id.to_owned(), status);
    }
}

#[async_trait]
impl FeedSource for FakeFeed {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_latest(&self, channel_id: &str) -> FeedStatus {
        self.statuses
            .lock()
            .get(channel_id)
            .cloned()
            .unwrap_or(FeedStatus::NotFound)
    }

    async fn lookup_account(&self, name: &str) -> Result<Option<Account>> {
        let id = normalize_account(self.platform, name);
        Ok(Some(account("Creator", id)))
    }
}

/// A message effect observed by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Send { channel: String, message: String },
    Edit { channel: String, message: String },
    Delete { channel: String, message: String },
}

impl Call {
    pub(crate) fn send(channel: &str, message: &str) -> Self {
        Call::Send {
            channel: channel.to_owned(),
            message: message.to_owned(),
        }
    }

    pub(crate) fn edit(channel: &str, message: &str) -> Self {
        Call::Edit {
            channel: channel.to_owned(),
            message: message.to_owned(),
        }
    }

    pub(crate) fn delete(channel: &str, message: &str) -> Self {
        Call::Delete {
            channel: channel.to_owned(),
            message: message.to_owned(),
        }
    }
}

/// A sink which records effects and hands out message ids `m1`, `m2`, ...
#[derive(Default)]
pub(crate) struct RecordingSink {
    calls: Mutex<Vec<Call>>,
    next: AtomicUsize,
    removed: Mutex<HashSet<String>>,
    unavailable: Mutex<HashSet<String>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of messages sent.
    pub(crate) fn sent(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Send { .. }))
            .count()
    }

    /// Simulate a message deleted by someone else.
    pub(crate) fn remove_message(&self, message_id: &str) {
        self.removed.lock().insert(message_id.to_owned());
    }

    pub(crate) fn make_unavailable(&self, channel_id: &str) {
        self.unavailable.lock().insert(channel_id.to_owned());
    }

    /// Fail the next effect with a generic error.
    pub(crate) fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn check(&self, channel_id: &str, message_id: Option<&str>) -> Result<(), SinkError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(SinkError::Other(anyhow!("simulated failure")));
        }

        if self.unavailable.lock().contains(channel_id) {
            return Err(SinkError::ChannelUnavailable(channel_id.to_owned()));
        }

        if let Some(message_id) = message_id {
            if self.removed.lock().contains(message_id) {
                return Err(SinkError::MessageNotFound);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_message(
        &self,
        channel_id: &str,
        _: &NotificationContent,
    ) -> Result<String, SinkError> {
        self.check(channel_id, None)?;
        // Widen the window in which concurrent passes could interleave.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let message_id = format!("m{}", self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.calls.lock().push(Call::send(channel_id, &message_id));
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        _: &NotificationContent,
    ) -> Result<(), SinkError> {
        self.check(channel_id, Some(message_id))?;
        self.calls.lock().push(Call::edit(channel_id, message_id));
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), SinkError> {
        self.check(channel_id, Some(message_id))?;
        self.calls.lock().push(Call::delete(channel_id, message_id));
        self.removed.lock().insert(message_id.to_owned());
        Ok(())
    }
}
