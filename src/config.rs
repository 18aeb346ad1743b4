//! Runtime configuration from a YAML file or `FARM2KITCHEN_*` environment variables
use crate::moderation::TransitionPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE_PATH: &str = "FARM2KITCHEN_DATABASE_PATH";
pub const ENV_API_URL: &str = "FARM2KITCHEN_API_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "FARM2KITCHEN_REQUEST_TIMEOUT_SECS";
pub const ENV_TRANSITION_POLICY: &str = "FARM2KITCHEN_TRANSITION_POLICY";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub transition_policy: TransitionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("farm2kitchen.db"),
            api_base_url: "http://localhost:8000/api".to_string(),
            request_timeout_secs: 30,
            transition_policy: TransitionPolicy::Free,
        }
    }
}

impl Config {
    /// Load a YAML config file. Missing keys fall back to defaults.
    pub fn load(config_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(config_path.as_ref())?;
        let config = serde_yml::from_str(&contents)?;

        Ok(config)
    }

    /// Read `FARM2KITCHEN_*` variables, after loading a `.env` file if present.
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(url) = lookup(ENV_API_URL) {
            config.api_base_url = url;
        }
        if let Some(secs) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            config.request_timeout_secs = secs
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{ENV_REQUEST_TIMEOUT_SECS}: {e}"))?;
        }
        if let Some(policy) = lookup(ENV_TRANSITION_POLICY) {
            config.transition_policy = policy.parse()?;
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
