//! Management of subscriptions on behalf of administrators.
//!
//! Adding a subscription from Discord is a two step process: the draft is
//! validated and staged under the id of the confirmation prompt, then
//! committed once somebody accepts it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{normalize_account, NewSubscription, Platform, Subscription};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

use crate::{LockMap, Reconciler};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("subscription not found")]
    NotFound,
    #[error("no pending subscription for this prompt, it might have expired")]
    UnknownProposal,
    #[error("could not find `{name}` on {platform}")]
    UnknownAccount { platform: Platform, name: String },
    #[error("{0} is not enabled")]
    PlatformDisabled(Platform),
    #[error("{0}")]
    Invalid(&'static str),
    #[error("this channel already follows `{0}`")]
    Duplicate(String),
    #[error("failed to look up account")]
    Lookup(#[source] anyhow::Error),
    #[error("storage failure")]
    Store(#[from] anyhow::Error),
}

struct Pending {
    draft: NewSubscription,
    expires_at: Instant,
}

/// Drafts waiting for confirmation, keyed by prompt id.
///
/// Entries expire after a fixed time to live and are never persisted.
#[derive(Clone)]
pub struct Proposals {
    ttl: Duration,
    pending: Arc<Mutex<HashMap<String, Pending>>>,
}

impl Proposals {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn insert(&self, prompt_id: String, draft: NewSubscription) {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        pending.retain(|_, p| p.expires_at > now);

        pending.insert(
            prompt_id,
            Pending {
                draft,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Remove and return the draft staged under the prompt, unless expired.
    pub fn take(&self, prompt_id: &str) -> Option<NewSubscription> {
        let pending = self.pending.lock().remove(prompt_id)?;

        if pending.expires_at <= Instant::now() {
            return None;
        }

        Some(pending.draft)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Subscription management shared by slash commands and the web API.
#[derive(Clone)]
pub struct Admin {
    reconciler: Reconciler,
    proposals: Proposals,
    /// Serializes commits of the same platform, account and channel.
    commits: LockMap,
}

impl Admin {
    pub fn new(reconciler: Reconciler, proposals: Proposals) -> Self {
        Self {
            reconciler,
            proposals,
            commits: LockMap::new(),
        }
    }

    /// Validate a draft and resolve its account on the platform.
    ///
    /// The returned draft carries the canonical account identifier and the
    /// display name reported by the platform.
    pub async fn prepare(&self, draft: NewSubscription) -> Result<NewSubscription, AdminError> {
        // Looked up as typed, the platform reports its own casing.
        let requested = draft.account.trim().to_owned();
        let mut draft = draft.normalized();

        if draft.account.is_empty() {
            return Err(AdminError::Invalid("missing account name"));
        }

        if draft.channel_id.trim().is_empty() {
            return Err(AdminError::Invalid("missing target channel"));
        }

        let sources = self.reconciler.sources();

        if !sources.contains(draft.platform) {
            return Err(AdminError::PlatformDisabled(draft.platform));
        }

        let account = sources
            .lookup_account(draft.platform, &requested)
            .await
            .map_err(AdminError::Lookup)?;

        let Some(account) = account else {
            return Err(AdminError::UnknownAccount {
                platform: draft.platform,
                name: draft.account,
            });
        };

        draft.account = if draft.platform.uses_channel_id() {
            account.id
        } else {
            normalize_account(draft.platform, &account.login)
        };

        if !account.display_name.is_empty() {
            draft.display_name = account.display_name;
        } else if draft.display_name.is_empty() {
            draft.display_name = draft.account.clone();
        }

        self.check_duplicate(&draft).await?;
        Ok(draft)
    }

    /// Stage a prepared draft under the id of its confirmation prompt.
    pub fn stage(&self, prompt_id: String, draft: NewSubscription) {
        self.proposals.insert(prompt_id, draft);
    }

    /// Commit the draft staged under the prompt.
    pub async fn confirm(
        &self,
        prompt_id: &str,
        confirmed_by: &str,
    ) -> Result<Subscription, AdminError> {
        let mut draft = self
            .proposals
            .take(prompt_id)
            .ok_or(AdminError::UnknownProposal)?;

        draft.added_by = confirmed_by.to_owned();
        self.commit(draft).await
    }

    /// Drop the draft staged under the prompt.
    pub fn reject(&self, prompt_id: &str) -> Result<NewSubscription, AdminError> {
        self.proposals
            .take(prompt_id)
            .ok_or(AdminError::UnknownProposal)
    }

    /// Prepare and commit a draft in one go.
    pub async fn add(&self, draft: NewSubscription) -> Result<Subscription, AdminError> {
        let draft = self.prepare(draft).await?;
        self.commit(draft).await
    }

    pub async fn list(&self, server_id: &str) -> Result<Vec<Subscription>, AdminError> {
        Ok(self.reconciler.store().list_by_server(server_id).await?)
    }

    /// Remove a subscription owned by the given server.
    pub async fn remove(&self, server_id: &str, id: &str) -> Result<Subscription, AdminError> {
        let s = self.reconciler.store().get(id).await?;

        let Some(s) = s.filter(|s| s.server_id == server_id) else {
            return Err(AdminError::NotFound);
        };

        self.retire(s).await
    }

    /// Remove the subscriptions of a server following an account, optionally
    /// limited to a single channel.
    pub async fn remove_matching(
        &self,
        server_id: &str,
        platform: Platform,
        account: &str,
        channel_id: Option<&str>,
    ) -> Result<Vec<Subscription>, AdminError> {
        let mut account = normalize_account(platform, account);
        let store = self.reconciler.store();

        let mut found = store.find_by_account(platform, &account).await?;

        // Channel id platforms are usually referred to by handle.
        if found.is_empty() && platform.uses_channel_id() {
            let resolved = self
                .reconciler
                .sources()
                .lookup_account(platform, &account)
                .await
                .map_err(AdminError::Lookup)?;

            if let Some(resolved) = resolved {
                account = resolved.id;
                found = store.find_by_account(platform, &account).await?;
            }
        }

        let matching = found
            .into_iter()
            .filter(|s| s.server_id == server_id)
            .filter(|s| channel_id.map_or(true, |c| s.channel_id == c))
            .collect::<Vec<_>>();

        if matching.is_empty() {
            return Err(AdminError::NotFound);
        }

        let mut removed = Vec::with_capacity(matching.len());

        for s in matching {
            removed.push(self.retire(s).await?);
        }

        Ok(removed)
    }

    async fn check_duplicate(&self, draft: &NewSubscription) -> Result<(), AdminError> {
        let existing = self
            .reconciler
            .store()
            .find_by_account(draft.platform, &draft.account)
            .await?;

        if existing.iter().any(|s| s.channel_id == draft.channel_id) {
            return Err(AdminError::Duplicate(draft.display_name.clone()));
        }

        Ok(())
    }

    /// Persist a prepared draft, subscribe to push notifications and run a
    /// first pass right away.
    #[tracing::instrument(
        skip_all,
        fields(platform = draft.platform.as_str(), account = draft.account.as_str())
    )]
    async fn commit(&self, draft: NewSubscription) -> Result<Subscription, AdminError> {
        let key = format!("{}:{}:{}", draft.platform, draft.account, draft.channel_id);
        let guard = self.commits.lock(&key).await;

        self.check_duplicate(&draft).await?;

        let display_name = draft.display_name.clone();
        let id = uuid::Uuid::new_v4().to_string();
        let mut s = draft.into_subscription(id, Utc::now());

        let store = self.reconciler.store();

        if let Err(e) = store.insert(&s).await {
            if e.downcast_ref::<common::store::Conflict>().is_some() {
                return Err(AdminError::Duplicate(display_name));
            }

            return Err(AdminError::Store(e));
        }

        drop(guard);

        tracing::info!(
            id = s.id.as_str(),
            added_by = s.added_by.as_str(),
            "Added subscription"
        );

        if let Some(source) = self.reconciler.sources().live(s.platform) {
            if let Some(handle) = source.event_subscribe(&s.account).await {
                store.set_event_subscription(&s.id, Some(&handle)).await?;
                s.event_subscription = Some(handle);
            }
        }

        let reconciler = self.reconciler.clone();
        let id = s.id.clone();

        tokio::spawn(async move {
            if let Err(e) = reconciler.reconcile(&id).await {
                common::log_error!(e, "{}: initial reconciliation failed", id);
            }
        });

        Ok(s)
    }

    /// Delete a subscription and cancel push notifications for its account
    /// if nothing else follows it.
    async fn retire(&self, s: Subscription) -> Result<Subscription, AdminError> {
        let store = self.reconciler.store();

        let Some(removed) = store.delete(&s.id).await? else {
            return Err(AdminError::NotFound);
        };

        tracing::info!(id = removed.id.as_str(), "Removed subscription");

        let remaining = store.find_by_account(removed.platform, &removed.account).await?;

        if remaining.is_empty() {
            if let Some(source) = self.reconciler.sources().live(removed.platform) {
                if let Err(e) = source
                    .event_unsubscribe(&removed.account, removed.event_subscription.as_deref())
                    .await
                {
                    common::log_warn!(
                        e,
                        "{}: failed to cancel push notifications",
                        removed.account
                    );
                }
            }
        }

        Ok(removed)
    }
}
