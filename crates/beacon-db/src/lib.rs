mod models;
pub mod schema;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::store::Conflict;
use common::{Platform, RuntimeState, Subscription, SubscriptionStore};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_migrations::{EmbeddedMigrations, HarnessWithOutput, MigrationHarness};
use parking_lot::Mutex;

use self::models::Row;

pub const MIGRATIONS: EmbeddedMigrations = diesel_migrations::embed_migrations!("./migrations");

/// Bind `$t` to the schema module of the table backing `$platform`.
macro_rules! with_table {
    ($platform:expr, $t:ident => $body:expr) => {
        match $platform {
            Platform::Twitch => {
                use $crate::schema::twitch_subscriptions as $t;
                $body
            }
            Platform::Kick => {
                use $crate::schema::kick_subscriptions as $t;
                $body
            }
            Platform::YoutubeLive => {
                use $crate::schema::youtube_live_subscriptions as $t;
                $body
            }
            Platform::YoutubeLatest => {
                use $crate::schema::youtube_latest_subscriptions as $t;
                $body
            }
            Platform::YoutubeShort => {
                use $crate::schema::youtube_short_subscriptions as $t;
                $body
            }
        }
    };
}

/// Database abstraction.
#[derive(Clone)]
pub struct Database {
    pool: Arc<Mutex<SqliteConnection>>,
}

impl Database {
    /// Open the database at the given path, running pending migrations.
    pub fn open(path: &Path) -> Result<Database> {
        let url = path.display().to_string();
        tracing::info!("Using database: {}", url);
        Self::connect(&url)
    }

    /// Open a database which only lives in memory.
    pub fn open_in_memory() -> Result<Database> {
        Self::connect(":memory:")
    }

    fn connect(url: &str) -> Result<Database> {
        let mut pool = SqliteConnection::establish(url)?;

        let mut output = Vec::new();

        // Run all migrations and provide some diagnostics on errors.
        let result: Result<()> = {
            let mut harness = HarnessWithOutput::new(&mut pool, &mut output);

            match harness.run_pending_migrations(MIGRATIONS) {
                Ok(..) => Ok(()),
                Err(e) => Err(anyhow!("{}", e)),
            }
        };
        let output = String::from_utf8_lossy(&output);
        result.with_context(|| anyhow!("error when running migrations: {}", output))?;

        if !output.is_empty() {
            tracing::trace!("Migrations output:\n{}", output);
        }

        Ok(Database {
            pool: Arc::new(Mutex::new(pool)),
        })
    }

    /// Run a blocking task with exlusive access to the database pool.
    pub async fn asyncify<F, T, E>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        E: From<tokio::task::JoinError>,
    {
        let pool = self.pool.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut guard = pool.lock();
            task(&mut guard)
        })
        .await;

        match result {
            Ok(result) => result,
            Err(e) => Err(E::from(e)),
        }
    }
}

/// Find which table holds the given subscription.
fn find(c: &mut SqliteConnection, id: &str) -> Result<Option<(Platform, Row)>> {
    for platform in Platform::ALL {
        let row = with_table!(platform, t => {
            t::table
                .filter(t::id.eq(id))
                .first::<Row>(c)
                .optional()?
        });

        if let Some(row) = row {
            return Ok(Some((platform, row)));
        }
    }

    Ok(None)
}

fn sorted(mut subscriptions: Vec<Subscription>) -> Vec<Subscription> {
    subscriptions.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    subscriptions
}

#[async_trait]
impl SubscriptionStore for Database {
    async fn get(&self, id: &str) -> Result<Option<Subscription>> {
        let id = id.to_owned();

        self.asyncify(move |c| {
            let found = find(c, &id)?;
            Ok(found.map(|(platform, row)| row.into_subscription(platform)))
        })
        .await
    }

    async fn list_by_platform(&self, platform: Platform) -> Result<Vec<Subscription>> {
        self.asyncify(move |c| {
            let rows = with_table!(platform, t => {
                t::table
                    .order((t::created_at.asc(), t::id.asc()))
                    .load::<Row>(c)?
            });

            Ok(rows
                .into_iter()
                .map(|row| row.into_subscription(platform))
                .collect())
        })
        .await
    }

    async fn list_by_server(&self, server_id: &str) -> Result<Vec<Subscription>> {
        let server_id = server_id.to_owned();

        self.asyncify(move |c| {
            let mut out = Vec::new();

            for platform in Platform::ALL {
                let rows = with_table!(platform, t => {
                    t::table
                        .filter(t::server_id.eq(&server_id))
                        .load::<Row>(c)?
                });

                out.extend(rows.into_iter().map(|row| row.into_subscription(platform)));
            }

            Ok(sorted(out))
        })
        .await
    }

    async fn find_by_account(
        &self,
        platform: Platform,
        account: &str,
    ) -> Result<Vec<Subscription>> {
        let account = account.to_owned();

        self.asyncify(move |c| {
            let rows = with_table!(platform, t => {
                t::table
                    .filter(t::account.eq(&account))
                    .order((t::created_at.asc(), t::id.asc()))
                    .load::<Row>(c)?
            });

            Ok(rows
                .into_iter()
                .map(|row| row.into_subscription(platform))
                .collect())
        })
        .await
    }

    async fn update_runtime_state(&self, id: &str, state: &RuntimeState) -> Result<bool> {
        let id = id.to_owned();
        let state = state.clone();

        self.asyncify(move |c| {
            for platform in Platform::ALL {
                let count = with_table!(platform, t => {
                    diesel::update(t::table.filter(t::id.eq(&id)))
                        .set((
                            t::message_id.eq(state.message_id.clone()),
                            t::terminal_id.eq(state.terminal_id.clone()),
                        ))
                        .execute(c)?
                });

                if count > 0 {
                    return Ok(true);
                }
            }

            Ok(false)
        })
        .await
    }

    async fn set_event_subscription(&self, id: &str, handle: Option<&str>) -> Result<bool> {
        let id = id.to_owned();
        let handle = handle.map(str::to_owned);

        self.asyncify(move |c| {
            for platform in Platform::ALL {
                let count = with_table!(platform, t => {
                    diesel::update(t::table.filter(t::id.eq(&id)))
                        .set(t::event_subscription.eq(handle.clone()))
                        .execute(c)?
                });

                if count > 0 {
                    return Ok(true);
                }
            }

            Ok(false)
        })
        .await
    }

    async fn insert(&self, s: &Subscription) -> Result<()> {
        let s = s.clone();

        self.asyncify(move |c| {
            let result = with_table!(s.platform, t => {
                diesel::insert_into(t::table)
                    .values((
                        t::id.eq(&s.id),
                        t::account.eq(&s.account),
                        t::display_name.eq(&s.display_name),
                        t::server_id.eq(&s.server_id),
                        t::channel_id.eq(&s.channel_id),
                        t::added_by.eq(&s.added_by),
                        t::message.eq(s.message.clone()),
                        t::mention.eq(s.mention.clone()),
                        t::keep_vod.eq(s.keep_vod),
                        t::social_links.eq(s.social_links),
                        t::social_link_url.eq(s.social_link_url.clone()),
                        t::message_id.eq(s.state.message_id.clone()),
                        t::terminal_id.eq(s.state.terminal_id.clone()),
                        t::event_subscription.eq(s.event_subscription.clone()),
                        t::created_at.eq(s.created_at.naive_utc()),
                    ))
                    .execute(c)
            });

            match result {
                Ok(..) => Ok(()),
                Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                    Err(Conflict::new(&s).into())
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<Option<Subscription>> {
        let id = id.to_owned();

        self.asyncify(move |c| {
            let Some((platform, row)) = find(c, &id)? else {
                return Ok(None);
            };

            with_table!(platform, t => {
                diesel::delete(t::table.filter(t::id.eq(&id))).execute(c)?
            });

            Ok(Some(row.into_subscription(platform)))
        })
        .await
    }
}
