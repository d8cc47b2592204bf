use anyhow::{bail, Result};
use bytes::Bytes;
use reqwest::{header, Client, Method, StatusCode, Url};
use thiserror::Error;

use crate::token::{AccessToken, TokenManager};

#[derive(Debug, Error)]
#[error("error when sending request")]
struct SendRequestError(#[source] reqwest::Error);

#[derive(Debug, Error)]
#[error("error when receiving response")]
struct ReceiveResponseError(#[source] reqwest::Error);

pub const USER_AGENT: &str = concat!("Beacon/", env!("CARGO_PKG_VERSION"));

/// Trait to deal with optional bodies.
pub trait BodyHelper {
    type Value;

    /// Get a present body as an option.
    fn some(self) -> Option<Self::Value>;
}

impl BodyHelper for Bytes {
    type Value = Bytes;

    fn some(self) -> Option<Self::Value> {
        Some(self)
    }
}

impl BodyHelper for Option<Bytes> {
    type Value = Bytes;

    fn some(self) -> Option<Self::Value> {
        self
    }
}

#[derive(Clone)]
pub struct RequestBuilder {
    token: Option<TokenManager>,
    client: Client,
    url: Url,
    method: Method,
    headers: Vec<(header::HeaderName, String)>,
    body: Bytes,
    /// Add the client id of the token to the specified header.
    client_id_header: Option<header::HeaderName>,
}

impl RequestBuilder {
    /// Construct a new request builder.
    pub fn new(client: Client, method: Method, url: Url) -> Self {
        Self {
            token: None,
            client,
            url,
            method,
            headers: Vec::new(),
            body: Bytes::new(),
            client_id_header: None,
        }
    }

    /// Use the specified Client-ID header.
    pub fn client_id_header(mut self, header: header::HeaderName) -> Self {
        self.client_id_header = Some(header);
        self
    }

    /// Set the token to use.
    pub fn token(self, token: TokenManager) -> Self {
        Self {
            token: Some(token),
            ..self
        }
    }

    /// Change the body of the request.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize the given value as a JSON body.
    pub fn json_body<T>(self, value: &T) -> Result<Self>
    where
        T: serde::Serialize,
    {
        let body = serde_json::to_vec(value)?;

        Ok(self
            .header(header::CONTENT_TYPE, "application/json")
            .body(body))
    }

    /// Push a header.
    pub fn header(mut self, key: header::HeaderName, value: &str) -> Self {
        self.headers.push((key, value.to_owned()));
        self
    }

    /// Add a query parameter.
    pub fn query_param(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    /// Execute the request.
    ///
    /// An unauthorized response causes the token to be refreshed and the
    /// request to be sent once more.
    pub async fn execute(&self) -> Result<Response<Bytes>> {
        let Some(manager) = &self.token else {
            return self.send(None).await;
        };

        let token = manager.get().await?;
        let response = self.send(Some(&token)).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!("Unauthorized: {}: {}: refreshing token", self.method, self.url);
        let token = manager.refresh(&token).await?;
        self.send(Some(&token)).await
    }

    async fn send(&self, token: Option<&AccessToken>) -> Result<Response<Bytes>> {
        tracing::trace!("Request: {}: {}", self.method, self.url);
        let mut req = self.client.request(self.method.clone(), self.url.clone());

        req = match self.method {
            Method::GET | Method::HEAD => req,
            _ => req
                .header(header::CONTENT_LENGTH, self.body.len())
                .body(self.body.clone()),
        };

        for (key, value) in &self.headers {
            req = req.header(key.clone(), value);
        }

        if let Some(token) = token {
            req = req.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.payload.as_str()),
            );
        }

        if let (Some(header), Some(manager)) = (&self.client_id_header, &self.token) {
            req = req.header(header.clone(), manager.client_id());
        }

        let res = req.send().await.map_err(SendRequestError)?;
        let status = res.status();
        let body = res.bytes().await.map_err(ReceiveResponseError)?;

        if tracing::enabled!(tracing::Level::TRACE) {
            let response = String::from_utf8_lossy(&body);
            tracing::trace!(
                "Response: {}: {}: {}: {}",
                self.method,
                self.url,
                status,
                response
            );
        }

        Ok(Response {
            method: self.method.clone(),
            url: self.url.clone(),
            status,
            body,
        })
    }
}

pub struct Response<B> {
    method: Method,
    url: Url,
    status: StatusCode,
    body: B,
}

impl<B> Response<B> {
    /// The status of the response.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl Response<Bytes> {
    /// Expect a successful response.
    pub fn ok(self) -> Result<()> {
        if self.status.is_success() {
            return Ok(());
        }

        let body = String::from_utf8_lossy(self.body.as_ref());

        bail!(
            "Bad response: {}: {}: {}: {}",
            self.method,
            self.url,
            self.status,
            body
        );
    }

    /// Expect a JSON response of the given type.
    pub fn json<T>(self) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if !self.status.is_success() {
            let body = String::from_utf8_lossy(self.body.as_ref());
            bail!(
                "Bad response: {}: {}: {}: {}",
                self.method,
                self.url,
                self.status,
                body
            );
        }

        match serde_json::from_slice(self.body.as_ref()) {
            Ok(body) => Ok(body),
            Err(e) => {
                let body = String::from_utf8_lossy(self.body.as_ref());
                bail!(
                    "Bad response: {}: {}: {}: {}: {}",
                    self.method,
                    self.url,
                    self.status,
                    e,
                    body
                );
            }
        }
    }
}

impl Response<Option<Bytes>> {
    /// Expect a JSON response of the given type.
    pub fn json<T>(self) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = match self.body {
            Some(body) => body,
            None => return Ok(None),
        };

        Response {
            method: self.method,
            url: self.url,
            status: self.status,
            body,
        }
        .json()
        .map(Some)
    }
}

impl<B> Response<B>
where
    B: BodyHelper,
{
    /// Handle as empty if we encounter the given status code.
    pub fn empty_on_status(self, status: StatusCode) -> Response<Option<B::Value>> {
        let body = if self.status == status {
            None
        } else {
            self.body.some()
        };

        Response {
            method: self.method,
            url: self.url,
            status: self.status,
            body,
        }
    }

    /// Test if the underlying status is not found.
    pub fn not_found(self) -> Response<Option<B::Value>> {
        self.empty_on_status(StatusCode::NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{TokenResponse, TokenSource};
    use crate::LiveStatus;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use warp::Filter as _;

    #[derive(Clone, Default)]
    struct Grants {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenSource for Grants {
        async fn fetch(&self) -> Result<TokenResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);

            Ok(TokenResponse {
                access_token: crate::TokenPayload::new(&format!("token-{}", n)),
                expires_in: 3600,
                token_type: Some("bearer".into()),
            })
        }
    }

    /// Serve `{"data":[]}`, answering the first `unauthorized` requests with
    /// a 401. Returns the url and the authorization header of each request.
    fn serve(unauthorized: usize) -> (Url, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        let route = warp::header::optional::<String>("authorization").map(
            move |auth: Option<String>| {
                let mut log = log.lock();
                log.push(auth.unwrap_or_default());

                let status = if log.len() <= unauthorized {
                    warp::http::StatusCode::UNAUTHORIZED
                } else {
                    warp::http::StatusCode::OK
                };

                warp::reply::with_status(warp::reply::json(&serde_json::json!({"data": []})), status)
            },
        );

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let url = Url::parse(&format!("http://{}/helix/streams", addr)).unwrap();
        (url, seen)
    }

    fn status(response: Result<Response<Bytes>>) -> LiveStatus {
        LiveStatus::from_result(
            response
                .and_then(|r| r.json::<serde_json::Value>())
                .map(|_| LiveStatus::Offline(None)),
        )
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once() -> Result<()> {
        let (url, seen) = serve(1);
        let grants = Grants::default();
        let manager = TokenManager::new("test", "id".into(), grants.clone(), None);

        let response = RequestBuilder::new(Client::new(), Method::GET, url)
            .token(manager)
            .execute()
            .await;

        assert_eq!(response.as_ref().map(|r| r.status()).ok(), Some(StatusCode::OK));
        assert_eq!(*seen.lock(), ["Bearer token-0", "Bearer token-1"]);
        assert_eq!(grants.calls.load(Ordering::SeqCst), 2);
        assert!(matches!(status(response), LiveStatus::Offline(None)));
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_unauthorized_is_transient() -> Result<()> {
        let (url, seen) = serve(usize::MAX);
        let grants = Grants::default();
        let manager = TokenManager::new("test", "id".into(), grants.clone(), None);

        let response = RequestBuilder::new(Client::new(), Method::GET, url)
            .token(manager)
            .execute()
            .await;

        assert_eq!(
            response.as_ref().map(|r| r.status()).ok(),
            Some(StatusCode::UNAUTHORIZED)
        );
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(grants.calls.load(Ordering::SeqCst), 2);
        assert!(matches!(status(response), LiveStatus::TransientError(..)));
        Ok(())
    }
}
