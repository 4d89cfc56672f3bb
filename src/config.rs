use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FEED_URL: &str = "https://www.citibikenyc.com/stations/json";
const DEFAULT_USER_AGENT: &str = "Rollout/0.1 bike-share availability";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_FEED_TIMEOUT_SECS: u64 = 30;

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed_url: String,
    pub feed_user_agent: String,
    /// Upper bound on a single feed fetch, including an inline re-fetch.
    pub feed_timeout: Duration,
    pub port: u16,
    /// Directory holding the station snapshot and the preference store.
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Numeric values that fail to parse are logged and replaced by their
    /// defaults rather than aborting startup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            feed_url: lookup("FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            feed_user_agent: lookup("FEED_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            feed_timeout: Duration::from_secs(parse_or_default(
                "FEED_TIMEOUT_SECS",
                lookup("FEED_TIMEOUT_SECS"),
                DEFAULT_FEED_TIMEOUT_SECS,
            )),
            port: parse_or_default("PORT", lookup("PORT"), DEFAULT_PORT),
            data_dir: PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string())),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("stations.json")
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }
}

fn parse_or_default<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match raw {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid value '{}' for {}, falling back to {}",
                value,
                key,
                default
            );
            default
        }),
    }
}
