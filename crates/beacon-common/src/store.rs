//! Persistence contract for subscriptions.

mod memory;
pub use self::memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::{Platform, RuntimeState, Subscription};

/// Returned by [`SubscriptionStore::insert`] when the channel already follows
/// the account on the platform.
#[derive(Debug, Error)]
#[error("{platform} account `{account}` is already followed in channel {channel_id}")]
pub struct Conflict {
    pub platform: Platform,
    pub account: String,
    pub channel_id: String,
}

impl Conflict {
    pub fn new(subscription: &Subscription) -> Self {
        Self {
            platform: subscription.platform,
            account: subscription.account.clone(),
            channel_id: subscription.channel_id.clone(),
        }
    }
}

/// Durable storage of subscriptions.
///
/// Writes are last-write-wins per row.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Get a single subscription by id.
    async fn get(&self, id: &str) -> Result<Option<Subscription>>;

    /// List every subscription of a platform.
    async fn list_by_platform(&self, platform: Platform) -> Result<Vec<Subscription>>;

    /// List every subscription owned by a server.
    async fn list_by_server(&self, server_id: &str) -> Result<Vec<Subscription>>;

    /// Find every subscription following the given normalized account.
    async fn find_by_account(&self, platform: Platform, account: &str)
        -> Result<Vec<Subscription>>;

    /// Replace the runtime state of a subscription.
    ///
    /// Returns `false` if the subscription no longer exists.
    async fn update_runtime_state(&self, id: &str, state: &RuntimeState) -> Result<bool>;

    /// Store the handle of the platform side push subscription.
    async fn set_event_subscription(&self, id: &str, handle: Option<&str>) -> Result<bool>;

    /// Insert a new subscription.
    ///
    /// Fails with a [`Conflict`] if the channel already follows the account.
    async fn insert(&self, subscription: &Subscription) -> Result<()>;

    /// Delete a subscription, returning the removed row.
    async fn delete(&self, id: &str) -> Result<Option<Subscription>>;
}
