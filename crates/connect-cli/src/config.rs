use std::time::Duration;

use anyhow::Context;

use connect_client::SyncSettings;
use connect_types::Principal;

/// Runtime configuration, read from the environment after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub actor_url: String,
    pub blob_url: String,
    pub token: Option<String>,
    pub principal: Principal,
    pub sync: SyncSettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let actor_url =
            std::env::var("CONNECT_ACTOR_URL").unwrap_or_else(|_| "http://127.0.0.1:4943".into());
        let blob_url = std::env::var("CONNECT_BLOB_URL").unwrap_or_else(|_| actor_url.clone());
        let token = std::env::var("CONNECT_TOKEN").ok().filter(|t| !t.is_empty());
        let principal = match std::env::var("CONNECT_PRINCIPAL") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid CONNECT_PRINCIPAL '{}'", raw))?,
            Err(_) => Principal::anonymous(),
        };

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            reels_poll: secs("CONNECT_REELS_POLL_SECS", defaults.reels_poll)?,
            stories_poll: secs("CONNECT_STORIES_POLL_SECS", defaults.stories_poll)?,
            messages_poll: secs("CONNECT_MESSAGES_POLL_SECS", defaults.messages_poll)?,
            cache_idle_ttl: secs("CONNECT_CACHE_IDLE_SECS", defaults.cache_idle_ttl)?,
        };

        Ok(Self {
            actor_url,
            blob_url,
            token,
            principal,
            sync,
        })
    }
}

fn secs(var: &str, default: Duration) -> anyhow::Result<Duration> {
    match std::env::var(var) {
        Ok(raw) => {
            let n: u64 = raw.parse().with_context(|| format!("{} must be whole seconds", var))?;
            anyhow::ensure!(n > 0, "{} must be greater than zero", var);
            Ok(Duration::from_secs(n))
        }
        Err(_) => Ok(default),
    }
}
