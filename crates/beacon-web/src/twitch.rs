//! Twitch EventSub webhook callback.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use common::Platform;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use warp::http::{HeaderMap, StatusCode};
use warp::reply::Response;
use warp::{filters, path, Filter as _, Reply as _};

use crate::{custom_reject, Error, Web, BODY_LIMIT};

type HmacSha256 = Hmac<Sha256>;

const MESSAGE_ID: &str = "twitch-eventsub-message-id";
const MESSAGE_TIMESTAMP: &str = "twitch-eventsub-message-timestamp";
const MESSAGE_SIGNATURE: &str = "twitch-eventsub-message-signature";
const MESSAGE_TYPE: &str = "twitch-eventsub-message-type";

/// Messages older than this are rejected to prevent replays.
const MAX_AGE: Duration = Duration::minutes(10);

#[derive(Debug, Deserialize)]
struct Challenge {
    challenge: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionInfo {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Event {
    broadcaster_user_login: String,
}

#[derive(Debug, Deserialize)]
struct Notification {
    subscription: SubscriptionInfo,
    event: Event,
}

#[derive(Debug, Deserialize)]
struct Revocation {
    subscription: SubscriptionInfo,
}

/// Verify `sha256=hex(HMAC-SHA256(secret, id + timestamp + body))`.
pub(crate) fn verify_signature(
    secret: &[u8],
    id: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
) -> bool {
    let Some(signature) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(signature) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };

    mac.update(id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Test that a message timestamp is recent enough.
fn is_fresh(timestamp: &str, now: DateTime<Utc>) -> bool {
    let Ok(timestamp) = DateTime::parse_from_rfc3339(timestamp) else {
        return false;
    };

    let age = now.signed_duration_since(timestamp.with_timezone(&Utc));
    age <= MAX_AGE && age >= -MAX_AGE
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Error> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(Error::Forbidden)
}

fn json<'de, T>(body: &'de [u8]) -> Result<T, Error>
where
    T: Deserialize<'de>,
{
    serde_json::from_slice(body).map_err(|e| Error::BadRequest(e.to_string()))
}

async fn callback(web: Web, headers: HeaderMap, body: Bytes) -> Result<Response, Error> {
    let Some(secret) = web.twitch_secret.as_deref() else {
        return Err(Error::Unavailable);
    };

    let id = header(&headers, MESSAGE_ID)?;
    let timestamp = header(&headers, MESSAGE_TIMESTAMP)?;
    let signature = header(&headers, MESSAGE_SIGNATURE)?;
    let ty = header(&headers, MESSAGE_TYPE)?;

    if !verify_signature(secret.as_bytes(), id, timestamp, &body, signature) {
        tracing::warn!(id, "Rejected EventSub message with a bad signature");
        return Err(Error::Forbidden);
    }

    if !is_fresh(timestamp, Utc::now()) {
        tracing::warn!(id, timestamp, "Rejected stale EventSub message");
        return Err(Error::Forbidden);
    }

    match ty {
        "webhook_callback_verification" => {
            let challenge = json::<Challenge>(&body)?;
            tracing::info!("Answering EventSub verification challenge");

            let reply = warp::reply::with_header(
                challenge.challenge,
                "content-type",
                "text/plain",
            );

            Ok(reply.into_response())
        }
        "notification" => {
            let notification = json::<Notification>(&body)?;
            let login = notification.event.broadcaster_user_login;

            tracing::debug!(
                ty = notification.subscription.ty.as_str(),
                login = login.as_str(),
                "EventSub notification"
            );

            web.push.schedule(Platform::Twitch, &login).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        "revocation" => {
            let revocation = json::<Revocation>(&body)?;

            tracing::warn!(
                ty = revocation.subscription.ty.as_str(),
                status = revocation.subscription.status.as_deref().unwrap_or("unknown"),
                "EventSub subscription revoked"
            );

            Ok(StatusCode::NO_CONTENT.into_response())
        }
        other => {
            tracing::debug!(ty = other, "Ignoring EventSub message");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

/// `POST /twitch/callback`
pub(crate) fn route(web: Web) -> filters::BoxedFilter<(Response,)> {
    warp::post()
        .and(path!("twitch" / "callback"))
        .and(warp::header::headers_cloned())
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::bytes())
        .and_then(move |headers: HeaderMap, body: Bytes| {
            let web = web.clone();
            async move { callback(web, headers, body).await.map_err(custom_reject) }
        })
        .boxed()
}
