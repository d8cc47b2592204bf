use std::time::Duration;

use anyhow::Result;
use common::{normalize_account, Platform};

use crate::Reconciler;

/// Schedules reconciliation passes in response to platform push
/// notifications.
#[derive(Clone)]
pub struct PushScheduler {
    reconciler: Reconciler,
    delay: Duration,
}

impl PushScheduler {
    /// Passes run `delay` after the notification arrived, which gives the
    /// platform API time to reflect the change.
    pub fn new(reconciler: Reconciler, delay: Duration) -> Self {
        Self { reconciler, delay }
    }

    /// Schedule a pass for every subscription following the account.
    ///
    /// Returns the number of scheduled passes.
    #[tracing::instrument(skip(self), fields(platform = platform.as_str()))]
    pub async fn schedule(&self, platform: Platform, account: &str) -> Result<usize> {
        let account = normalize_account(platform, account);
        let subscriptions = self
            .reconciler
            .store()
            .find_by_account(platform, &account)
            .await?;

        if subscriptions.is_empty() {
            tracing::debug!(account = account.as_str(), "No subscriptions follow account");
            return Ok(0);
        }

        tracing::info!(account = account.as_str(), "Scheduling {} passes", subscriptions.len());

        for s in &subscriptions {
            let reconciler = self.reconciler.clone();
            let delay = self.delay;
            let id = s.id.clone();

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;

                if let Err(e) = reconciler.reconcile(&id).await {
                    common::log_error!(e, "{}: reconciliation failed", id);
                }
            });
        }

        Ok(subscriptions.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{self, FakeLive, RecordingSink};
    use crate::Sources;
    use api::LiveStatus;
    use common::{MemoryStore, SubscriptionStore as _};

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_delay() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let kick = Arc::new(FakeLive::new(Platform::Kick));

        let mut a = testing::subscription("a", Platform::Kick, "alice");
        store.insert(&a).await?;
        a.id = "b".into();
        a.channel_id = "101".into();
        store.insert(&a).await?;

        kick.set("alice", LiveStatus::Live(testing::stream("2025-01-01T18:00:00Z")));

        let reconciler = Reconciler::new(
            store.clone(),
            sink.clone(),
            Sources::new().with_live(kick.clone()),
        );
        let push = PushScheduler::new(reconciler, Duration::from_secs(5));

        assert_eq!(push.schedule(Platform::Kick, "Alice").await?, 2);
        assert_eq!(push.schedule(Platform::Kick, "nobody").await?, 0);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(kick.fetches(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(kick.fetches(), 2);
        assert_eq!(sink.sent(), 2);
        Ok(())
    }
}
