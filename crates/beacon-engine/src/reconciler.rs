use std::sync::Arc;

use anyhow::{Context as _, Result};
use api::{FeedStatus, LiveStatus};
use common::{
    NotificationContent, NotificationSink, PlatformKind, RuntimeState, SinkError, Subscription,
    SubscriptionStore,
};

use crate::locks::LockMap;
use crate::render;
use crate::transition::{self, FeedAction, LiveAction};
use crate::Sources;

/// The result of a single reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A message was posted.
    Created { message_id: String },
    /// The posted message was refreshed.
    Edited,
    /// The posted message was gone and had to be posted again.
    Recreated { message_id: String },
    /// The posted message was retracted.
    Deleted,
    /// The posted message was turned into its archived form.
    Archived,
    /// Tracking of the posted message was dropped.
    Forgotten,
    /// New content was announced.
    Announced { message_id: String },
    /// Nothing changed.
    Unchanged,
    /// The subscription could not be processed this time, like when its
    /// channel is unavailable or the platform is not configured.
    Skipped,
    /// The subscription does not exist anymore.
    Missing,
}

impl Outcome {
    /// Short name of the outcome used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created { .. } => "created",
            Outcome::Edited => "edited",
            Outcome::Recreated { .. } => "recreated",
            Outcome::Deleted => "deleted",
            Outcome::Archived => "archived",
            Outcome::Forgotten => "forgotten",
            Outcome::Announced { .. } => "announced",
            Outcome::Unchanged => "unchanged",
            Outcome::Skipped => "skipped",
            Outcome::Missing => "missing",
        }
    }
}

struct Inner {
    store: Arc<dyn SubscriptionStore>,
    sink: Arc<dyn NotificationSink>,
    sources: Sources,
    locks: LockMap,
}

/// Keeps the message of each subscription in line with its platform.
///
/// Passes for the same subscription are serialized; passes for different
/// subscriptions run independently.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        sink: Arc<dyn NotificationSink>,
        sources: Sources,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                sink,
                sources,
                locks: LockMap::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.inner.store
    }

    pub fn sources(&self) -> &Sources {
        &self.inner.sources
    }

    /// Run one reconciliation pass for the given subscription.
    ///
    /// The subscription is read after its lock has been acquired, so a pass
    /// always observes the state left behind by the previous one.
    #[tracing::instrument(
        skip(self),
        fields(platform = tracing::field::Empty, account = tracing::field::Empty)
    )]
    pub async fn reconcile(&self, id: &str) -> Result<Outcome> {
        let _guard = self.inner.locks.lock(id).await;

        let Some(subscription) = self.inner.store.get(id).await? else {
            tracing::debug!("Subscription is gone");
            return Ok(Outcome::Missing);
        };

        let span = tracing::Span::current();
        span.record("platform", subscription.platform.as_str());
        span.record("account", subscription.account.as_str());

        let outcome = match subscription.platform.kind() {
            PlatformKind::Live => self.reconcile_live(&subscription).await?,
            PlatformKind::Feed => self.reconcile_feed(&subscription).await?,
        };

        tracing::debug!(outcome = outcome.as_str(), "Reconciled");
        Ok(outcome)
    }

    async fn reconcile_live(&self, s: &Subscription) -> Result<Outcome> {
        let Some(source) = self.inner.sources.live(s.platform) else {
            tracing::debug!("No source configured");
            return Ok(Outcome::Skipped);
        };

        let status = source.fetch_status(&s.account).await;

        let action = transition::live(&s.state, s.keep_vod, &status);
        let sink = &self.inner.sink;

        match action {
            LiveAction::Create(stream) => {
                let content = render::live(s, stream);

                let message_id = match sink.send_message(&s.channel_id, &content).await {
                    Ok(message_id) => message_id,
                    Err(e) => return self.sink_error(s, e),
                };

                let state = RuntimeState::new(Some(message_id.clone()), Some(stream.stream_id.clone()));
                self.persist(s, &state).await?;
                Ok(Outcome::Created { message_id })
            }
            LiveAction::Edit { message_id, stream } => {
                let content = render::live(s, stream);

                match sink.edit_message(&s.channel_id, message_id, &content).await {
                    Ok(()) => {
                        if s.state.terminal_id.as_deref() != Some(stream.stream_id.as_str()) {
                            let state = RuntimeState::new(
                                Some(message_id.to_owned()),
                                Some(stream.stream_id.clone()),
                            );

                            self.persist(s, &state).await?;
                        }

                        Ok(Outcome::Edited)
                    }
                    Err(SinkError::MessageNotFound) => {
                        tracing::info!(message_id, "Message is gone, posting a new one");
                        self.recreate(s, &content, &stream.stream_id).await
                    }
                    Err(e) => self.sink_error(s, e),
                }
            }
            LiveAction::Delete { message_id } => {
                match sink.delete_message(&s.channel_id, message_id).await {
                    Ok(()) | Err(SinkError::MessageNotFound) => {}
                    Err(e) => return self.sink_error(s, e),
                }

                self.persist(s, &RuntimeState::EMPTY).await?;
                Ok(Outcome::Deleted)
            }
            LiveAction::Archive { message_id, vod } => {
                let content = render::archived(s, vod);

                let outcome = match sink.edit_message(&s.channel_id, message_id, &content).await {
                    Ok(()) => Outcome::Archived,
                    Err(SinkError::MessageNotFound) => Outcome::Forgotten,
                    Err(e) => return self.sink_error(s, e),
                };

                self.persist(s, &RuntimeState::EMPTY).await?;
                Ok(outcome)
            }
            LiveAction::Forget => {
                tracing::debug!("No matching VOD, dropping message tracking");
                self.persist(s, &RuntimeState::EMPTY).await?;
                Ok(Outcome::Forgotten)
            }
            LiveAction::Nothing => {
                match &status {
                    LiveStatus::NotFound => {
                        tracing::debug!("Account not found on platform");
                    }
                    LiveStatus::TransientError(reason) => {
                        tracing::warn!(reason = reason.as_str(), "Failed to fetch status");
                    }
                    _ => {}
                }

                Ok(Outcome::Unchanged)
            }
        }
    }

    async fn reconcile_feed(&self, s: &Subscription) -> Result<Outcome> {
        let Some(source) = self.inner.sources.feed(s.platform) else {
            tracing::debug!("No source configured");
            return Ok(Outcome::Skipped);
        };

        let status = source.fetch_latest(&s.account).await;

        match transition::feed(&s.state, &status) {
            FeedAction::Announce(content) => {
                let rendered = render::content(s, content);

                let message_id = match self.inner.sink.send_message(&s.channel_id, &rendered).await {
                    Ok(message_id) => message_id,
                    Err(e) => return self.sink_error(s, e),
                };

                let state = RuntimeState::new(None, Some(content.id.clone()));
                self.persist(s, &state).await?;
                Ok(Outcome::Announced { message_id })
            }
            FeedAction::Nothing => {
                if let FeedStatus::TransientError(reason) = &status {
                    tracing::warn!(reason = reason.as_str(), "Failed to fetch latest content");
                }

                Ok(Outcome::Unchanged)
            }
        }
    }

    /// Post a replacement for a message which disappeared.
    async fn recreate(
        &self,
        s: &Subscription,
        content: &NotificationContent,
        stream_id: &str,
    ) -> Result<Outcome> {
        let message_id = match self.inner.sink.send_message(&s.channel_id, content).await {
            Ok(message_id) => message_id,
            Err(e) => return self.sink_error(s, e),
        };

        let state = RuntimeState::new(Some(message_id.clone()), Some(stream_id.to_owned()));
        self.persist(s, &state).await?;
        Ok(Outcome::Recreated { message_id })
    }

    async fn persist(&self, s: &Subscription, state: &RuntimeState) -> Result<()> {
        let updated = self
            .inner
            .store
            .update_runtime_state(&s.id, state)
            .await
            .with_context(|| format!("{}: storing state after a successful effect", s.id))?;

        if !updated {
            tracing::debug!("Subscription was removed during the pass");
        }

        Ok(())
    }

    /// Handle a failed message effect. The stored state is left as-is so that
    /// the next pass retries.
    fn sink_error(&self, s: &Subscription, error: SinkError) -> Result<Outcome> {
        match error {
            SinkError::ChannelUnavailable(channel) => {
                tracing::debug!(
                    channel = channel.as_str(),
                    server = s.server_id.as_str(),
                    "Channel unavailable, skipping"
                );
                Ok(Outcome::Skipped)
            }
            SinkError::MessageNotFound => {
                tracing::debug!("Message not found, skipping");
                Ok(Outcome::Skipped)
            }
            SinkError::Other(e) => Err(e.context(format!("{}: message effect failed", s.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Call, FakeFeed, FakeLive, RecordingSink};
    use common::{MemoryStore, Platform};

    struct Harness {
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        twitch: Arc<FakeLive>,
        feed: Arc<FakeFeed>,
        reconciler: Reconciler,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let twitch = Arc::new(FakeLive::new(Platform::Twitch));
        let feed = Arc::new(FakeFeed::new(Platform::YoutubeLatest));

        let sources = Sources::new()
            .with_live(twitch.clone())
            .with_feed(feed.clone());

        let reconciler = Reconciler::new(store.clone(), sink.clone(), sources);

        Harness {
            store,
            sink,
            twitch,
            feed,
            reconciler,
        }
    }

    async fn insert(h: &Harness, id: &str, platform: Platform, account: &str, keep_vod: bool) {
        let mut s = testing::subscription(id, platform, account);
        s.keep_vod = keep_vod;
        h.store.insert(&s).await.unwrap();
    }

    async fn state(h: &Harness, id: &str) -> RuntimeState {
        h.store.get(id).await.unwrap().unwrap().state
    }

    #[tokio::test]
    async fn test_live_then_offline_deletes() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", false).await;

        h.twitch.set("alice", LiveStatus::Live(testing::stream("s123")));
        assert_eq!(
            h.reconciler.reconcile("a").await?,
            Outcome::Created {
                message_id: "m1".into()
            }
        );
        assert_eq!(h.sink.calls(), vec![Call::send("100", "m1")]);
        assert_eq!(state(&h, "a").await, RuntimeState::new(Some("m1".into()), Some("s123".into())));

        h.twitch.set("alice", LiveStatus::Offline(None));
        assert_eq!(h.reconciler.reconcile("a").await?, Outcome::Deleted);
        assert_eq!(h.sink.calls()[1], Call::delete("100", "m1"));
        assert_eq!(state(&h, "a").await, RuntimeState::EMPTY);
        Ok(())
    }

    #[tokio::test]
    async fn test_repoll_edits_in_place() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", false).await;
        h.twitch.set("alice", LiveStatus::Live(testing::stream("s123")));

        h.reconciler.reconcile("a").await?;
        assert_eq!(h.reconciler.reconcile("a").await?, Outcome::Edited);
        assert_eq!(h.reconciler.reconcile("a").await?, Outcome::Edited);

        assert_eq!(
            h.sink.calls(),
            vec![
                Call::send("100", "m1"),
                Call::edit("100", "m1"),
                Call::edit("100", "m1")
            ]
        );
        assert_eq!(state(&h, "a").await.message_id.as_deref(), Some("m1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_message_is_recreated() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", false).await;
        h.twitch.set("alice", LiveStatus::Live(testing::stream("s123")));

        h.reconciler.reconcile("a").await?;
        h.sink.remove_message("m1");

        assert_eq!(
            h.reconciler.reconcile("a").await?,
            Outcome::Recreated {
                message_id: "m2".into()
            }
        );
        assert_eq!(state(&h, "a").await, RuntimeState::new(Some("m2".into()), Some("s123".into())));
        Ok(())
    }

    #[tokio::test]
    async fn test_new_stream_while_tracked_updates_terminal_id() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", false).await;

        h.twitch.set("alice", LiveStatus::Live(testing::stream("s1")));
        h.reconciler.reconcile("a").await?;

        h.twitch.set("alice", LiveStatus::Live(testing::stream("s2")));
        assert_eq!(h.reconciler.reconcile("a").await?, Outcome::Edited);
        assert_eq!(state(&h, "a").await, RuntimeState::new(Some("m1".into()), Some("s2".into())));
        Ok(())
    }

    #[tokio::test]
    async fn test_vod_is_archived_once() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", true).await;

        h.twitch.set("alice", LiveStatus::Live(testing::stream("s123")));
        h.reconciler.reconcile("a").await?;

        h.twitch.set("alice", LiveStatus::Offline(Some(testing::vod("s123"))));
        assert_eq!(h.reconciler.reconcile("a").await?, Outcome::Archived);
        assert_eq!(state(&h, "a").await, RuntimeState::EMPTY);

        assert_eq!(h.reconciler.reconcile("a").await?, Outcome::Unchanged);
        assert_eq!(
            h.sink.calls(),
            vec![Call::send("100", "m1"), Call::edit("100", "m1")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_vod_drops_tracking() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", true).await;

        h.twitch.set("alice", LiveStatus::Live(testing::stream("s123")));
        h.reconciler.reconcile("a").await?;

        h.twitch.set("alice", LiveStatus::Offline(Some(testing::vod("s000"))));
        assert_eq!(h.reconciler.reconcile("a").await?, Outcome::Forgotten);
        assert_eq!(h.sink.calls().len(), 1);
        assert_eq!(state(&h, "a").await, RuntimeState::EMPTY);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_send_leaves_state_untouched() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", false).await;
        h.twitch.set("alice", LiveStatus::Live(testing::stream("s123")));

        h.sink.fail_next();
        assert!(h.reconciler.reconcile("a").await.is_err());
        assert_eq!(state(&h, "a").await, RuntimeState::EMPTY);

        assert!(matches!(h.reconciler.reconcile("a").await?, Outcome::Created { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_unavailable_channel_is_skipped() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", false).await;
        h.twitch.set("alice", LiveStatus::Live(testing::stream("s123")));
        h.sink.make_unavailable("100");

        assert_eq!(h.reconciler.reconcile("a").await?, Outcome::Skipped);
        assert!(h.store.get("a").await?.is_some());
        assert_eq!(state(&h, "a").await, RuntimeState::EMPTY);
        Ok(())
    }

    #[tokio::test]
    async fn test_errors_leave_state_untouched() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", false).await;
        h.twitch.set("alice", LiveStatus::Live(testing::stream("s123")));
        h.reconciler.reconcile("a").await?;

        for status in [
            LiveStatus::NotFound,
            LiveStatus::TransientError("timeout".into()),
        ] {
            h.twitch.set("alice", status);
            assert_eq!(h.reconciler.reconcile("a").await?, Outcome::Unchanged);
        }

        assert_eq!(state(&h, "a").await, RuntimeState::new(Some("m1".into()), Some("s123".into())));
        assert_eq!(h.sink.calls().len(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_create_one_message() -> Result<()> {
        let h = harness();
        insert(&h, "a", Platform::Twitch, "alice", false).await;
        h.twitch.set("alice", LiveStatus::Live(testing::stream("s123")));

        let mut tasks = Vec::new();

        for _ in 0..4 {
            let reconciler = h.reconciler.clone();
            tasks.push(tokio::spawn(async move { reconciler.reconcile("a").await }));
        }

        let mut created = 0;

        for task in tasks {
            if let Outcome::Created { .. } = task.await?? {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(h.sink.sent(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_feed_announces_once() -> Result<()> {
        let h = harness();
        insert(&h, "f", Platform::YoutubeLatest, "UCabc", false).await;

        h.feed.set("UCabc", FeedStatus::Latest(testing::content("v1")));
        assert!(matches!(h.reconciler.reconcile("f").await?, Outcome::Announced { .. }));
        assert_eq!(h.reconciler.reconcile("f").await?, Outcome::Unchanged);

        h.feed.set("UCabc", FeedStatus::Latest(testing::content("v2")));
        assert!(matches!(h.reconciler.reconcile("f").await?, Outcome::Announced { .. }));

        assert_eq!(h.sink.sent(), 2);
        assert_eq!(state(&h, "f").await, RuntimeState::new(None, Some("v2".into())));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_and_unconfigured() -> Result<()> {
        let h = harness();
        assert_eq!(h.reconciler.reconcile("nope").await?, Outcome::Missing);

        insert(&h, "k", Platform::Kick, "alice", false).await;
        assert_eq!(h.reconciler.reconcile("k").await?, Outcome::Skipped);
        Ok(())
    }
}
