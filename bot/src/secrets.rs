//! Helper for storing and loading secrets.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, bail, Context as _, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct Secrets {
    #[serde(flatten)]
    secrets: HashMap<String, serde_yaml::Value>,
}

impl Secrets {
    /// Open the given file as secrets.
    pub(crate) fn open(path: &Path) -> Result<Secrets> {
        let f = File::open(path)?;
        Ok(serde_yaml::from_reader(f)?)
    }

    /// Load the given section of secrets if it is present.
    pub(crate) fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(value) = self.secrets.get(key) else {
            return Ok(None);
        };

        let value = serde_yaml::from_value(value.clone())
            .with_context(|| anyhow!("failed to deserialize secret `{}`", key))?;

        Ok(Some(value))
    }

    /// Load the given section of secrets.
    pub(crate) fn load<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        match self.get(key)? {
            Some(value) => Ok(value),
            None => bail!("missing required secrets key: {}", key),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Discord {
    pub(crate) token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Twitch {
    pub(crate) client_secret: String,
    #[serde(default)]
    pub(crate) eventsub_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Kick {
    pub(crate) client_secret: String,
    #[serde(default)]
    pub(crate) webhook_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct YouTube {
    pub(crate) api_key: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Web {
    #[serde(default)]
    pub(crate) api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections() -> Result<()> {
        let secrets = serde_yaml::from_str::<Secrets>(
            r#"
discord:
  token: bot-token
twitch:
  client_secret: abc
"#,
        )?;

        assert_eq!(secrets.load::<Discord>("discord")?.token, "bot-token");

        let twitch = secrets.load::<Twitch>("twitch")?;
        assert_eq!(twitch.client_secret, "abc");
        assert!(twitch.eventsub_secret.is_none());

        assert!(secrets.get::<Kick>("kick")?.is_none());
        assert!(secrets.load::<YouTube>("youtube").is_err());
        Ok(())
    }
}
