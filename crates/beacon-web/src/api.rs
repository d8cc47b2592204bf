//! Administration API used by the dashboard.

use common::{NewSubscription, Platform, Subscription};
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{body, filters, path, Filter as _, Rejection};

use crate::{constant_time_eq, custom_reject, Error, Web, BODY_LIMIT};

/// Added by when a subscription is created without naming a user.
const DASHBOARD: &str = "dashboard";

#[derive(Debug, Deserialize)]
struct AddSubscription {
    platform: Platform,
    account: String,
    server_id: String,
    channel_id: String,
    #[serde(default)]
    added_by: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    mention: Option<String>,
    #[serde(default)]
    keep_vod: bool,
    #[serde(default)]
    social_links: bool,
    #[serde(default)]
    social_link_url: Option<String>,
}

impl From<AddSubscription> for NewSubscription {
    fn from(body: AddSubscription) -> Self {
        NewSubscription {
            platform: body.platform,
            account: body.account,
            display_name: String::new(),
            server_id: body.server_id,
            channel_id: body.channel_id,
            added_by: body.added_by.unwrap_or_else(|| DASHBOARD.to_owned()),
            message: body.message,
            mention: body.mention,
            keep_vod: body.keep_vod,
            social_links: body.social_links,
            social_link_url: body.social_link_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerQuery {
    /// Only answer if this user administers the server.
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct Status {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct Listing {
    total: usize,
    subscriptions: Vec<Subscription>,
}

/// Check a bearer token against the configured key.
fn check(key: Option<&str>, header: Option<&str>) -> Result<(), Error> {
    let Some(key) = key else {
        return Err(Error::Unavailable);
    };

    let token = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(Error::Unauthorized)?;

    if !constant_time_eq(token.as_bytes(), key.as_bytes()) {
        return Err(Error::Unauthorized);
    }

    Ok(())
}

fn auth(web: Web) -> impl warp::Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let key = web.api_key.clone();
            async move { check(key.as_deref(), header.as_deref()).map_err(custom_reject) }
        })
        .untuple_one()
}

#[derive(Clone)]
struct Api(Web);

impl Api {
    async fn server(&self, server: &str, query: ServerQuery) -> Result<impl warp::Reply, Error> {
        let Some(guilds) = &self.0.guilds else {
            return Err(Error::Unavailable);
        };

        let Some(guild) = guilds.guild(server).await? else {
            return Err(Error::NotFound);
        };

        if let Some(user) = &query.user_id {
            if !guilds.is_administrator(server, user).await? {
                return Err(Error::Forbidden);
            }
        }

        Ok(warp::reply::json(&guild))
    }

    async fn list(&self, server: &str) -> Result<impl warp::Reply, Error> {
        let subscriptions = self.0.admin.list(server).await?;

        Ok(warp::reply::json(&Listing {
            total: subscriptions.len(),
            subscriptions,
        }))
    }

    async fn add(&self, body: AddSubscription) -> Result<impl warp::Reply, Error> {
        let subscription = self.0.admin.add(body.into()).await?;
        let json = warp::reply::json(&subscription);
        Ok(warp::reply::with_status(json, StatusCode::CREATED))
    }

    async fn remove(&self, server: &str, id: &str) -> Result<impl warp::Reply, Error> {
        let subscription = self.0.admin.remove(server, id).await?;
        Ok(warp::reply::json(&subscription))
    }
}

/// Routes under `/` and `/api/v1`, all requiring the bearer key.
pub(crate) fn route(web: Web) -> filters::BoxedFilter<(impl warp::Reply,)> {
    let auth = auth(web.clone());
    let api = Api(web);

    let status = warp::get().and(path::end()).and(auth.clone()).map(|| {
        warp::reply::json(&Status {
            message: "server is running",
        })
    });

    let server = warp::get()
        .and(path!("api" / "v1" / "servers" / String).and(path::end()))
        .and(auth.clone())
        .and(warp::query::<ServerQuery>())
        .and_then({
            let api = api.clone();
            move |server: String, query: ServerQuery| {
                let api = api.clone();
                async move { api.server(&server, query).await.map_err(custom_reject) }
            }
        });

    let list = warp::get()
        .and(path!("api" / "v1" / "servers" / String / "subscriptions").and(path::end()))
        .and(auth.clone())
        .and_then({
            let api = api.clone();
            move |server: String| {
                let api = api.clone();
                async move { api.list(&server).await.map_err(custom_reject) }
            }
        });

    let add = warp::post()
        .and(path!("api" / "v1" / "subscriptions").and(path::end()))
        .and(auth.clone())
        .and(body::content_length_limit(BODY_LIMIT))
        .and(body::json())
        .and_then({
            let api = api.clone();
            move |body: AddSubscription| {
                let api = api.clone();
                async move { api.add(body).await.map_err(custom_reject) }
            }
        });

    let remove = warp::delete()
        .and(path!("api" / "v1" / "servers" / String / "subscriptions" / String).and(path::end()))
        .and(auth)
        .and_then({
            let api = api.clone();
            move |server: String, id: String| {
                let api = api.clone();
                async move { api.remove(&server, &id).await.map_err(custom_reject) }
            }
        });

    status.or(server).or(list).or(add).or(remove).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, API_KEY};

    fn request(method: &str, path: &str) -> warp::test::RequestBuilder {
        warp::test::request()
            .method(method)
            .path(path)
            .header("authorization", format!("Bearer {}", API_KEY))
    }

    #[test]
    fn test_check() {
        assert!(matches!(check(None, Some("Bearer x")), Err(Error::Unavailable)));
        assert!(matches!(check(Some("x"), None), Err(Error::Unauthorized)));
        assert!(matches!(check(Some("x"), Some("x")), Err(Error::Unauthorized)));
        assert!(matches!(check(Some("x"), Some("Bearer y")), Err(Error::Unauthorized)));
        assert!(check(Some("x"), Some("Bearer x")).is_ok());
    }

    #[tokio::test]
    async fn test_status() {
        let t = testing::setup();
        let routes = crate::routes(t.web.with_api_key(Some(API_KEY.into())));

        let res = request("GET", "/").reply(&routes).await;
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["x-api-version"], crate::API_VERSION);

        let body = serde_json::from_slice::<serde_json::Value>(res.body()).unwrap();
        assert_eq!(body["message"], "server is running");

        let res = warp::test::request().path("/").reply(&routes).await;
        assert_eq!(res.status(), 401);

        let body = serde_json::from_slice::<serde_json::Value>(res.body()).unwrap();
        assert_eq!(body["code"], 401);
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let t = testing::setup();
        let routes = crate::routes(t.web);

        let res = request("GET", "/").reply(&routes).await;
        assert_eq!(res.status(), 503);
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let t = testing::setup();
        let routes = crate::routes(t.web.clone().with_api_key(Some(API_KEY.into())));

        let res = request("POST", "/api/v1/subscriptions")
            .json(&serde_json::json!({
                "platform": "twitch",
                "account": "@Alice",
                "server_id": "1",
                "channel_id": "100",
                "keep_vod": true,
            }))
            .reply(&routes)
            .await;

        assert_eq!(res.status(), 201);
        let added = serde_json::from_slice::<serde_json::Value>(res.body()).unwrap();
        assert_eq!(added["account"], "alice");
        assert_eq!(added["display_name"], "Alice");
        assert_eq!(added["added_by"], DASHBOARD);
        let id = added["id"].as_str().unwrap().to_owned();

        // Same account into the same channel.
        let res = request("POST", "/api/v1/subscriptions")
            .json(&serde_json::json!({
                "platform": "twitch",
                "account": "alice",
                "server_id": "1",
                "channel_id": "100",
            }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 409);

        let res = request("GET", "/api/v1/servers/1/subscriptions")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);
        let listing = serde_json::from_slice::<serde_json::Value>(res.body()).unwrap();
        assert_eq!(listing["total"], 1);

        let res = request("DELETE", &format!("/api/v1/servers/2/subscriptions/{}", id))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 404);

        let res = request("DELETE", &format!("/api/v1/servers/1/subscriptions/{}", id))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 200);

        let res = request("GET", "/api/v1/servers/1/subscriptions")
            .reply(&routes)
            .await;
        let listing = serde_json::from_slice::<serde_json::Value>(res.body()).unwrap();
        assert_eq!(listing["total"], 0);
    }

    #[tokio::test]
    async fn test_server() {
        let t = testing::setup();
        let web = t.web.with_api_key(Some(API_KEY.into()));

        let res = request("GET", "/api/v1/servers/1")
            .reply(&crate::routes(web.clone()))
            .await;
        assert_eq!(res.status(), 503);

        let routes = crate::routes(web.with_guilds(std::sync::Arc::new(testing::FakeGuilds)));

        let res = request("GET", "/api/v1/servers/1").reply(&routes).await;
        assert_eq!(res.status(), 200);

        let body = serde_json::from_slice::<serde_json::Value>(res.body()).unwrap();
        assert_eq!(body["name"], "Stream Team");
        assert_eq!(body["member_count"], 42);
        assert_eq!(body["roles"][0]["color"], "#1abc9c");
        assert_eq!(body["channels"][0]["type"], "text");

        let res = request("GET", "/api/v1/servers/1?user_id=7").reply(&routes).await;
        assert_eq!(res.status(), 200);

        let res = request("GET", "/api/v1/servers/1?user_id=8").reply(&routes).await;
        assert_eq!(res.status(), 403);

        let res = request("GET", "/api/v1/servers/2").reply(&routes).await;
        assert_eq!(res.status(), 404);

        let res = warp::test::request().path("/api/v1/servers/1").reply(&routes).await;
        assert_eq!(res.status(), 401);
    }

    #[tokio::test]
    async fn test_add_rejections() {
        let t = testing::setup();
        let routes = crate::routes(t.web.with_api_key(Some(API_KEY.into())));

        let res = request("POST", "/api/v1/subscriptions")
            .json(&serde_json::json!({
                "platform": "twitch",
                "account": "nobody",
                "server_id": "1",
                "channel_id": "100",
            }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 400);

        // YouTube is not configured in the fixture.
        let res = request("POST", "/api/v1/subscriptions")
            .json(&serde_json::json!({
                "platform": "youtube_latest",
                "account": "UC123",
                "server_id": "1",
                "channel_id": "100",
            }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), 400);

        let res = request("GET", "/api/v1/nothing").reply(&routes).await;
        assert_eq!(res.status(), 404);
    }
}
