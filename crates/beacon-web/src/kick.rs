//! Kick webhook callback.

use bytes::Bytes;
use common::Platform;
use serde::Deserialize;
use warp::http::{HeaderMap, StatusCode};
use warp::reply::Response;
use warp::{filters, path, Filter as _, Reply as _};

use crate::{constant_time_eq, custom_reject, Error, Web, BODY_LIMIT};

const WEBHOOK_TOKEN: &str = "kick-webhook-token";
const EVENT_TYPE: &str = "kick-event-type";

/// The only event which affects live status.
const STATUS_UPDATED: &str = "livestream.status.updated";

#[derive(Debug, Deserialize)]
struct Broadcaster {
    channel_slug: String,
}

/// The live flag in the payload is not trusted, the pass fetches the status.
#[derive(Debug, Deserialize)]
struct StatusUpdated {
    broadcaster: Broadcaster,
}

async fn callback(web: Web, headers: HeaderMap, body: Bytes) -> Result<Response, Error> {
    let Some(expected) = web.kick_token.as_deref() else {
        return Err(Error::Unavailable);
    };

    let token = headers
        .get(WEBHOOK_TOKEN)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if !constant_time_eq(token, expected.as_bytes()) {
        tracing::warn!("Rejected Kick webhook with a bad token");
        return Err(Error::Forbidden);
    }

    let ty = headers
        .get(EVENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if ty != STATUS_UPDATED {
        tracing::debug!(ty, "Ignoring Kick event");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let event = serde_json::from_slice::<StatusUpdated>(&body)
        .map_err(|e| Error::BadRequest(e.to_string()))?;

    let slug = event.broadcaster.channel_slug;
    tracing::debug!(slug = slug.as_str(), "Kick status updated");

    web.push.schedule(Platform::Kick, &slug).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `POST /kick/callback`
pub(crate) fn route(web: Web) -> filters::BoxedFilter<(Response,)> {
    warp::post()
        .and(path!("kick" / "callback"))
        .and(warp::header::headers_cloned())
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::bytes())
        .and_then(move |headers: HeaderMap, body: Bytes| {
            let web = web.clone();
            async move { callback(web, headers, body).await.map_err(custom_reject) }
        })
        .boxed()
}
