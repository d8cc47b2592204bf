//! Configuration loaded from `config.toml`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use relative_path::RelativePathBuf;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Path to the sqlite database, relative to the configuration file.
    #[serde(default = "default_database")]
    pub(crate) database: RelativePathBuf,
    /// Where cached platform tokens are stored.
    #[serde(default = "default_state_dir")]
    pub(crate) state_dir: RelativePathBuf,
    /// Secrets file, relative to the configuration file.
    #[serde(default)]
    pub(crate) secrets: Option<RelativePathBuf>,
    #[serde(default)]
    pub(crate) web: WebConfig,
    #[serde(default)]
    pub(crate) sweep: SweepConfig,
    #[serde(default)]
    pub(crate) proposals: ProposalsConfig,
    #[serde(default)]
    pub(crate) twitch: Option<TwitchConfig>,
    #[serde(default)]
    pub(crate) kick: Option<KickConfig>,
    #[serde(default)]
    pub(crate) youtube: Option<YouTubeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            state_dir: default_state_dir(),
            secrets: None,
            web: WebConfig::default(),
            sweep: SweepConfig::default(),
            proposals: ProposalsConfig::default(),
            twitch: None,
            kick: None,
            youtube: None,
        }
    }
}

impl Config {
    /// Load configuration from the given path, falling back to defaults if
    /// it doesn't exist.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            tracing::warn!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| anyhow!("failed to read configuration: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| anyhow!("failed to parse configuration: {}", path.display()))
    }
}

fn default_database() -> RelativePathBuf {
    RelativePathBuf::from("beacon.sql")
}

fn default_state_dir() -> RelativePathBuf {
    RelativePathBuf::from("state")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct WebConfig {
    #[serde(default = "default_host")]
    pub(crate) host: IpAddr,
    #[serde(default = "default_port")]
    pub(crate) port: u16,
    /// Public address of the server, needed to receive push notifications.
    #[serde(default)]
    pub(crate) public_url: Option<Url>,
}

impl WebConfig {
    pub(crate) fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Public url of an endpoint.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Option<Url>> {
        let Some(base) = &self.public_url else {
            return Ok(None);
        };

        Ok(Some(base.join(path)?))
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SweepConfig {
    /// Seconds between full sweeps.
    #[serde(default = "default_interval")]
    interval: u64,
    /// Seconds to wait after a push notification before checking status.
    #[serde(default = "default_push_delay")]
    push_delay: u64,
}

impl SweepConfig {
    pub(crate) fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    pub(crate) fn push_delay(&self) -> Duration {
        Duration::from_secs(self.push_delay)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            push_delay: default_push_delay(),
        }
    }
}

fn default_interval() -> u64 {
    600
}

fn default_push_delay() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ProposalsConfig {
    /// Seconds an unanswered `/add` prompt stays valid.
    #[serde(default = "default_ttl")]
    ttl: u64,
}

impl ProposalsConfig {
    pub(crate) fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

impl Default for ProposalsConfig {
    fn default() -> Self {
        Self { ttl: default_ttl() }
    }
}

fn default_ttl() -> u64 {
    15 * 60
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TwitchConfig {
    pub(crate) client_id: String,
    /// Subscribe to EventSub `stream.online` notifications.
    #[serde(default)]
    pub(crate) eventsub: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct KickConfig {
    pub(crate) client_id: String,
    /// Subscribe to `livestream.status.updated` webhooks.
    #[serde(default)]
    pub(crate) webhooks: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct YouTubeConfig {
    #[serde(default = "default_true")]
    pub(crate) enabled: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> Result<()> {
        let config = toml::from_str::<Config>("")?;
        assert_eq!(config.database.as_str(), "beacon.sql");
        assert_eq!(config.web.addr(), "127.0.0.1:8080".parse()?);
        assert_eq!(config.sweep.interval(), Duration::from_secs(600));
        assert_eq!(config.sweep.push_delay(), Duration::from_secs(5));
        assert_eq!(config.proposals.ttl(), Duration::from_secs(900));
        assert!(config.twitch.is_none());
        assert!(config.web.endpoint("/twitch/callback")?.is_none());
        Ok(())
    }

    #[test]
    fn test_full() -> Result<()> {
        let config = toml::from_str::<Config>(
            r#"
database = "data/beacon.sql"

[web]
host = "0.0.0.0"
port = 3000
public_url = "https://beacon.example.com/"

[sweep]
interval = 300

[twitch]
client_id = "abc"
eventsub = true

[kick]
client_id = "def"

[youtube]
"#,
        )?;

        assert_eq!(config.database.to_path("/srv"), Path::new("/srv/data/beacon.sql"));
        assert_eq!(config.web.port, 3000);
        assert_eq!(config.sweep.interval(), Duration::from_secs(300));

        let callback = config.web.endpoint("/twitch/callback")?;
        assert_eq!(
            callback.as_ref().map(Url::as_str),
            Some("https://beacon.example.com/twitch/callback")
        );

        assert!(config.twitch.as_ref().is_some_and(|t| t.eventsub));
        assert!(config.kick.as_ref().is_some_and(|k| !k.webhooks));
        assert!(config.youtube.as_ref().is_some_and(|y| y.enabled));
        Ok(())
    }

    #[test]
    fn test_unknown_key() {
        assert!(toml::from_str::<Config>("[web]\nprot = 1\n").is_err());
    }
}
