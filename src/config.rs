//! Environment-backed configuration.

use anyhow::Context;
use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the analytics API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Push channel address.
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,
    /// Poll period for both feeds, in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_owned()
}

fn default_websocket_url() -> String {
    "ws://localhost:8000".to_owned()
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Config {
    /// Load from the environment (`API_BASE_URL`, `WEBSOCKET_URL`,
    /// `REFRESH_INTERVAL`, `LOG_LEVEL`), falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let config: Config = Figment::new()
            .merge(Env::raw())
            .extract()
            .context("Failed to load config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let api = Url::parse(&self.api_base_url).context("invalid API_BASE_URL")?;
        if !matches!(api.scheme(), "http" | "https") {
            anyhow::bail!("API_BASE_URL must be http(s), got '{}'", api.scheme());
        }
        let ws = Url::parse(&self.websocket_url).context("invalid WEBSOCKET_URL")?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            anyhow::bail!("WEBSOCKET_URL must be ws(s), got '{}'", ws.scheme());
        }
        if self.refresh_interval == 0 {
            anyhow::bail!("REFRESH_INTERVAL must be at least 1 second");
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            websocket_url: default_websocket_url(),
            refresh_interval: default_refresh_interval(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.websocket_url, "ws://localhost:8000");
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_non_ws_push_url() {
        let config = Config {
            websocket_url: "http://localhost:8000".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let config = Config {
            refresh_interval: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
