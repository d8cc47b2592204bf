//! App access tokens for the platforms which require them.
//!
//! A [`TokenManager`] caches a single token per platform and persists it so
//! that restarts do not need a new grant. Concurrent refreshes are coalesced:
//! a caller which observed a stale token only triggers a new fetch if nobody
//! else has replaced that token in the meantime.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::backoff::Exponential;
use reqwest::{header, Client, Method, Url};
use serde::{de, ser, Deserialize, Serialize};

use crate::RequestBuilder;

/// Tokens which expire within this margin are treated as expired.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Upper bound on the lifetime reported by a token endpoint, in seconds.
const MAX_LIFETIME: u64 = 60 * 60 * 24 * 365;

/// Security wrapper for a token. This reduces the risk that the token is
/// inadvertently printed as it as a redacted debug implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPayload(Arc<str>);

impl TokenPayload {
    pub fn new(token: &str) -> Self {
        Self(Arc::from(token))
    }

    /// Get the string of the token.
    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }
}

impl fmt::Debug for TokenPayload {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TokenPayload").field(&"*secret*").finish()
    }
}

impl Serialize for TokenPayload {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        serializer.serialize_str(self.0.as_ref())
    }
}

impl<'de> Deserialize<'de> for TokenPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        Ok(Self(Arc::from(
            Cow::<str>::deserialize(deserializer)?.as_ref(),
        )))
    }
}

/// The body of a client credentials grant, which is also the persisted form
/// of a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: TokenPayload,
    /// Lifetime in seconds, counted from when the token was issued.
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    #[serde(flatten)]
    response: TokenResponse,
    expires_at: DateTime<Utc>,
}

/// A token handed out by a [`TokenManager`].
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub payload: TokenPayload,
    /// Identifies which fetch produced this token.
    generation: u64,
}

/// Something which can grant new tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<TokenResponse>;
}

/// How client credentials are passed to the token endpoint.
#[derive(Debug, Clone, Copy)]
pub enum CredentialStyle {
    /// As query parameters.
    Query,
    /// As an url-encoded form body.
    Form,
}

/// A client credentials grant against an OAuth2 token endpoint.
pub struct ClientCredentials {
    client: Client,
    url: Url,
    client_id: String,
    client_secret: String,
    style: CredentialStyle,
}

impl ClientCredentials {
    pub fn new(
        client: Client,
        url: Url,
        client_id: String,
        client_secret: String,
        style: CredentialStyle,
    ) -> Self {
        Self {
            client,
            url,
            client_id,
            client_secret,
            style,
        }
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch(&self) -> Result<TokenResponse> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let mut req = RequestBuilder::new(self.client.clone(), Method::POST, self.url.clone());

        req = match self.style {
            CredentialStyle::Query => {
                for (key, value) in params {
                    req = req.query_param(key, value);
                }

                req
            }
            CredentialStyle::Form => {
                let body = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params)
                    .finish();

                req.header(
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(body)
            }
        };

        req.execute()
            .await?
            .json::<TokenResponse>()
            .context("requesting app token")
    }
}

struct Cached {
    token: TokenPayload,
    expires_at: DateTime<Utc>,
    generation: u64,
}

struct Inner {
    name: &'static str,
    client_id: String,
    source: Box<dyn TokenSource>,
    path: Option<PathBuf>,
    cached: parking_lot::RwLock<Option<Cached>>,
    /// Held for the duration of a fetch.
    refresh: tokio::sync::Mutex<()>,
    retry_delay: Duration,
}

/// A synchronized, persisted app token.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Construct a new token manager.
    ///
    /// If `path` is specified, tokens are persisted to it and it is consulted
    /// before the first grant.
    pub fn new(
        name: &'static str,
        client_id: String,
        source: impl TokenSource + 'static,
        path: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                client_id,
                source: Box::new(source),
                path,
                cached: parking_lot::RwLock::new(None),
                refresh: tokio::sync::Mutex::new(()),
                retry_delay: Duration::from_secs(1),
            }),
        }
    }

    /// Change the delay before the single retry of a failed fetch.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.retry_delay = retry_delay;
        }

        self
    }

    /// The client id the token was granted to.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Get the current token, fetching a new one if it is absent or expired.
    pub async fn get(&self) -> Result<AccessToken> {
        if let Some(token) = self.current() {
            return Ok(token);
        }

        let _guard = self.inner.refresh.lock().await;

        if let Some(token) = self.current() {
            return Ok(token);
        }

        if let Some(token) = self.load().await {
            return Ok(token);
        }

        self.fetch().await
    }

    /// Replace a token which was rejected by the platform.
    ///
    /// If the token has already been replaced by someone else, the
    /// replacement is returned instead of fetching a new one.
    pub async fn refresh(&self, stale: &AccessToken) -> Result<AccessToken> {
        let _guard = self.inner.refresh.lock().await;

        if let Some(token) = self.current() {
            if token.generation != stale.generation {
                return Ok(token);
            }
        }

        self.fetch().await
    }

    fn current(&self) -> Option<AccessToken> {
        let cached = self.inner.cached.read();
        let cached = cached.as_ref()?;

        if !is_valid(cached.expires_at) {
            return None;
        }

        Some(AccessToken {
            payload: cached.token.clone(),
            generation: cached.generation,
        })
    }

    fn store(&self, token: TokenPayload, expires_at: DateTime<Utc>) -> AccessToken {
        let mut cached = self.inner.cached.write();

        let generation = cached.as_ref().map(|c| c.generation + 1).unwrap_or_default();

        *cached = Some(Cached {
            token: token.clone(),
            expires_at,
            generation,
        });

        AccessToken {
            payload: token,
            generation,
        }
    }

    /// Load a persisted token on first use. Only called with the refresh
    /// lock held.
    async fn load(&self) -> Option<AccessToken> {
        if self.inner.cached.read().is_some() {
            return None;
        }

        let path = self.inner.path.as_ref()?;
        let bytes = tokio::fs::read(path).await.ok()?;

        let stored = match serde_json::from_slice::<StoredToken>(&bytes) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("{}: ignoring corrupt token file {}: {}", self.inner.name, path.display(), e);
                return None;
            }
        };

        if !is_valid(stored.expires_at) {
            return None;
        }

        tracing::debug!("{}: loaded token from {}", self.inner.name, path.display());
        Some(self.store(stored.response.access_token, stored.expires_at))
    }

    /// Fetch a new token, retrying once. Only called with the refresh lock
    /// held.
    async fn fetch(&self) -> Result<AccessToken> {
        let mut backoff = Exponential::new(self.inner.retry_delay);

        let response = match self.inner.source.fetch().await {
            Ok(response) => response,
            Err(e) => {
                let delay = backoff.next();
                common::log_warn!(e, "{}: token fetch failed, retrying in {:?}", self.inner.name, delay);
                tokio::time::sleep(delay).await;

                self.inner
                    .source
                    .fetch()
                    .await
                    .with_context(|| format!("{}: token fetch failed twice", self.inner.name))?
            }
        };

        let lifetime = response.expires_in.min(MAX_LIFETIME) as i64;
        let expires_at = Utc::now() + chrono::Duration::seconds(lifetime);

        tracing::info!("{}: acquired new app token, expires at {}", self.inner.name, expires_at);

        if let Some(path) = &self.inner.path {
            let stored = StoredToken {
                response: response.clone(),
                expires_at,
            };

            if let Err(e) = persist(path, &stored).await {
                common::log_warn!(e, "{}: failed to persist token", self.inner.name);
            }
        }

        Ok(self.store(response.access_token, expires_at))
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("name", &self.inner.name)
            .field("client_id", &self.inner.client_id)
            .field("token", &"*secret*")
            .finish()
    }
}

fn is_valid(expires_at: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(EXPIRY_MARGIN) {
        Ok(margin) => Utc::now() + margin < expires_at,
        Err(..) => false,
    }
}

async fn persist(path: &std::path::Path, stored: &StoredToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let bytes = serde_json::to_vec_pretty(stored)?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
