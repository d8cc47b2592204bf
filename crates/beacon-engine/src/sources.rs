use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use api::{Account, FeedSource, LiveSource};
use common::Platform;

/// The platform clients which are configured.
#[derive(Clone, Default)]
pub struct Sources {
    live: HashMap<Platform, Arc<dyn LiveSource>>,
    feed: HashMap<Platform, Arc<dyn FeedSource>>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live source under the platform it reports.
    pub fn with_live(mut self, source: Arc<dyn LiveSource>) -> Self {
        self.live.insert(source.platform(), source);
        self
    }

    /// Register a feed source under the platform it reports.
    pub fn with_feed(mut self, source: Arc<dyn FeedSource>) -> Self {
        self.feed.insert(source.platform(), source);
        self
    }

    pub fn live(&self, platform: Platform) -> Option<&Arc<dyn LiveSource>> {
        self.live.get(&platform)
    }

    pub fn feed(&self, platform: Platform) -> Option<&Arc<dyn FeedSource>> {
        self.feed.get(&platform)
    }

    /// Test if any source is configured for the platform.
    pub fn contains(&self, platform: Platform) -> bool {
        self.live.contains_key(&platform) || self.feed.contains_key(&platform)
    }

    /// Configured platforms in a stable order.
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.contains(*p))
            .collect()
    }

    /// Resolve an account through whichever source serves the platform.
    ///
    /// Returns `Ok(None)` both if the platform is not configured and if the
    /// account does not exist.
    pub async fn lookup_account(&self, platform: Platform, name: &str) -> Result<Option<Account>> {
        if let Some(source) = self.live(platform) {
            return source.lookup_account(name).await;
        }

        if let Some(source) = self.feed(platform) {
            return source.lookup_account(name).await;
        }

        Ok(None)
    }
}
