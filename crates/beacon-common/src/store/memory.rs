use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::Conflict;
use crate::{Platform, RuntimeState, Subscription, SubscriptionStore};

/// In-memory store backed by a `HashMap`. Nothing is persisted.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, Subscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(&self, filter: F) -> Vec<Subscription>
    where
        F: Fn(&Subscription) -> bool,
    {
        let rows = self.rows.lock();

        let mut out = rows
            .values()
            .filter(|s| filter(s))
            .cloned()
            .collect::<Vec<_>>();

        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn list_by_platform(&self, platform: Platform) -> Result<Vec<Subscription>> {
        Ok(self.collect(|s| s.platform == platform))
    }

    async fn list_by_server(&self, server_id: &str) -> Result<Vec<Subscription>> {
        Ok(self.collect(|s| s.server_id == server_id))
    }

    async fn find_by_account(
        &self,
        platform: Platform,
        account: &str,
    ) -> Result<Vec<Subscription>> {
        Ok(self.collect(|s| s.platform == platform && s.account == account))
    }

    async fn update_runtime_state(&self, id: &str, state: &RuntimeState) -> Result<bool> {
        let mut rows = self.rows.lock();

        let Some(row) = rows.get_mut(id) else {
            return Ok(false);
        };

        row.state = state.clone();
        Ok(true)
    }

    async fn set_event_subscription(&self, id: &str, handle: Option<&str>) -> Result<bool> {
        let mut rows = self.rows.lock();

        let Some(row) = rows.get_mut(id) else {
            return Ok(false);
        };

        row.event_subscription = handle.map(str::to_owned);
        Ok(true)
    }

    async fn insert(&self, subscription: &Subscription) -> Result<()> {
        let mut rows = self.rows.lock();

        if rows.contains_key(&subscription.id) {
            bail!("subscription already exists: {}", subscription.id);
        }

        let taken = rows.values().any(|s| {
            s.platform == subscription.platform
                && s.account == subscription.account
                && s.channel_id == subscription.channel_id
        });

        if taken {
            return Err(Conflict::new(subscription).into());
        }

        rows.insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(self.rows.lock().remove(id))
    }
}
