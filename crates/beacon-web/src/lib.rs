//! HTTP surface of the bot: platform webhooks and the administration API.

mod api;
mod kick;
mod twitch;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use common::GuildDirectory;
use engine::{Admin, AdminError, PushScheduler};
use subtle::ConstantTimeEq as _;
use warp::http::StatusCode;
use warp::{Filter as _, Rejection, Reply};

/// Name reported in the `X-Service-Name` header.
pub const SERVICE_NAME: &str = "beacon";
/// Version reported in the `X-API-Version` header.
pub const API_VERSION: &str = "1.0.0";

/// Maximum accepted request body.
const BODY_LIMIT: u64 = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("endpoint is not configured")]
    Unavailable,
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl warp::reject::Reject for Error {}

impl From<AdminError> for Error {
    fn from(error: AdminError) -> Self {
        match error {
            AdminError::NotFound | AdminError::UnknownProposal => Error::NotFound,
            AdminError::Duplicate(..) => Error::Conflict(error.to_string()),
            AdminError::UnknownAccount { .. }
            | AdminError::PlatformDisabled(..)
            | AdminError::Invalid(..) => Error::BadRequest(error.to_string()),
            AdminError::Lookup(e) => Error::Custom(e.context("failed to look up account")),
            AdminError::Store(e) => Error::Custom(e),
        }
    }
}

pub(crate) fn custom_reject(error: impl Into<Error>) -> Rejection {
    warp::reject::custom(error.into())
}

/// Everything the HTTP endpoints need.
#[derive(Clone)]
pub struct Web {
    pub(crate) admin: Admin,
    pub(crate) push: PushScheduler,
    pub(crate) api_key: Option<Arc<str>>,
    pub(crate) twitch_secret: Option<Arc<str>>,
    pub(crate) kick_token: Option<Arc<str>>,
    pub(crate) guilds: Option<Arc<dyn GuildDirectory>>,
}

impl Web {
    pub fn new(admin: Admin, push: PushScheduler) -> Self {
        Self {
            admin,
            push,
            api_key: None,
            twitch_secret: None,
            kick_token: None,
            guilds: None,
        }
    }

    /// Key required as a bearer token by the administration API.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.map(Into::into);
        self
    }

    /// Secret used to verify Twitch EventSub messages.
    pub fn with_twitch_secret(mut self, secret: Option<String>) -> Self {
        self.twitch_secret = secret.map(Into::into);
        self
    }

    /// Directory used to describe Discord servers.
    pub fn with_guilds(mut self, guilds: Arc<dyn GuildDirectory>) -> Self {
        self.guilds = Some(guilds);
        self
    }

    /// Token expected in Kick webhook requests.
    pub fn with_kick_token(mut self, token: Option<String>) -> Self {
        self.kick_token = token.map(Into::into);
        self
    }
}

/// Compare two secrets in constant time.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

/// Build every route.
pub fn routes(web: Web) -> warp::filters::BoxedFilter<(impl Reply,)> {
    let routes = twitch::route(web.clone())
        .or(kick::route(web.clone()))
        .or(api::route(web));

    routes
        .recover(recover)
        .with(warp::reply::with::header("X-Service-Name", SERVICE_NAME))
        .with(warp::reply::with::header("X-API-Version", API_VERSION))
        .with(warp::trace::request())
        .boxed()
}

/// Set up the web server on the given address.
pub fn setup(addr: SocketAddr, web: Web) -> Result<impl Future<Output = ()>> {
    let service = warp::serve(routes(web));
    let (addr, server_future) = service.try_bind_ephemeral(addr)?;
    tracing::info!("Listening on http://{}", addr);
    Ok(server_future)
}

// This function receives a `Rejection` and tries to return a custom
// value, othewise simply passes the rejection along.
async fn recover(err: Rejection) -> Result<impl Reply, Rejection> {
    let Some(e) = err.find::<Error>() else {
        return Err(err);
    };

    let code = match e {
        Error::BadRequest(..) => StatusCode::BAD_REQUEST,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::Forbidden => StatusCode::FORBIDDEN,
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::Conflict(..) => StatusCode::CONFLICT,
        Error::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Error::Custom(e) => {
            tracing::error!("Endpoint error caused by: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let json = warp::reply::json(&ErrorMessage {
        code: code.as_u16(),
        message: e.to_string(),
    });

    Ok(warp::reply::with_status(json, code))
}

#[derive(serde::Serialize)]
struct ErrorMessage {
    code: u16,
    message: String,
}

#[cfg(test)]
mod testing;
