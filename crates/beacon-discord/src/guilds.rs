use std::sync::Arc;

use anyhow::{Context as _, Result};
use common::{Guild, GuildChannel, GuildDirectory, GuildRole};
use serenity::all::{GuildId, Http, UserId};
use serenity::async_trait;
use serenity::http::HttpError;

/// Discord error code for an unknown guild.
const UNKNOWN_GUILD: isize = 10004;

/// Server lookups through the Discord REST API.
#[derive(Clone)]
pub struct SerenityGuilds {
    http: Arc<Http>,
}

impl SerenityGuilds {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

/// Test if Discord answered that the guild does not exist or that the bot is
/// not a member of it.
fn is_missing(error: &serenity::Error) -> bool {
    let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = error else {
        return false;
    };

    response.error.code == UNKNOWN_GUILD || matches!(response.status_code.as_u16(), 403 | 404)
}

fn parse_id(id: &str) -> Option<u64> {
    id.trim().parse::<u64>().ok().filter(|id| *id != 0)
}

fn color(value: u32) -> String {
    format!("#{:06x}", value & 0xff_ffff)
}

#[async_trait]
impl GuildDirectory for SerenityGuilds {
    async fn guild(&self, id: &str) -> Result<Option<Guild>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };

        let guild_id = GuildId::new(id);

        let guild = match guild_id.to_partial_guild_with_counts(&self.http).await {
            Ok(guild) => guild,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("fetching guild {}", id)),
        };

        let channels = guild_id
            .channels(&self.http)
            .await
            .with_context(|| format!("fetching channels of guild {}", id))?;

        let mut roles = guild
            .roles
            .values()
            .map(|role| {
                (
                    role.position,
                    GuildRole {
                        id: role.id.to_string(),
                        name: role.name.clone(),
                        color: color(role.colour.0),
                    },
                )
            })
            .collect::<Vec<_>>();

        roles.sort_by(|a, b| b.0.cmp(&a.0));

        let mut channels = channels
            .into_values()
            .map(|c| {
                (
                    c.position,
                    GuildChannel {
                        id: c.id.to_string(),
                        name: c.name,
                        kind: c.kind.name().to_owned(),
                    },
                )
            })
            .collect::<Vec<_>>();

        channels.sort_by_key(|c| c.0);

        Ok(Some(Guild {
            id: guild.id.to_string(),
            name: guild.name.clone(),
            icon: guild.icon_url(),
            owner_id: guild.owner_id.to_string(),
            member_count: guild.approximate_member_count,
            roles: roles.into_iter().map(|(_, role)| role).collect(),
            channels: channels.into_iter().map(|(_, c)| c).collect(),
        }))
    }

    async fn is_administrator(&self, server: &str, user: &str) -> Result<bool> {
        let (Some(server), Some(user)) = (parse_id(server), parse_id(user)) else {
            return Ok(false);
        };

        let guild = match GuildId::new(server).to_partial_guild(&self.http).await {
            Ok(guild) => guild,
            Err(e) if is_missing(&e) => return Ok(false),
            Err(e) => return Err(e).with_context(|| format!("fetching guild {}", server)),
        };

        let member = match guild.member(&self.http, UserId::new(user)).await {
            Ok(member) => member,
            Err(e) if is_missing(&e) => return Ok(false),
            Err(e) => {
                return Err(e).with_context(|| format!("fetching member {} of {}", user, server))
            }
        };

        Ok(guild.member_permissions(&member).administrator())
    }
}

#[cfg(test)]
mod tests {
    use super::{color, parse_id};

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(" 123 "), Some(123));
        assert_eq!(parse_id("0"), None);
        assert_eq!(parse_id("abc"), None);
    }

    #[test]
    fn test_color() {
        assert_eq!(color(0), "#000000");
        assert_eq!(color(0x1abc9c), "#1abc9c");
        assert_eq!(color(0xff1abc9c), "#1abc9c");
    }
}
