//! Environment-backed configuration, validated before any request goes out.

use std::time::Duration;

use myplace_http::HttpClientConfig;
use myplace_sinks::SfmcSettings;
use myplace_source::DEFAULT_BASE_URL;
use thiserror::Error;

pub const MYPLACE_API_KEY: &str = "MYPLACE_API_KEY";
pub const MYPLACE_BASE_URL: &str = "MYPLACE_BASE_URL";
pub const MYPLACE_USER_AGENT: &str = "MYPLACE_USER_AGENT";
pub const MYPLACE_HTTP_TIMEOUT_SECS: &str = "MYPLACE_HTTP_TIMEOUT_SECS";
pub const SFMC_CLIENT_ID: &str = "SFMC_CLIENT_ID";
pub const SFMC_CLIENT_SECRET: &str = "SFMC_CLIENT_SECRET";
pub const SFMC_SUBDOMAIN: &str = "SFMC_SUBDOMAIN";
pub const SFMC_DATA_EXTENSION_KEY: &str = "SFMC_DATA_EXTENSION_KEY";

const DEFAULT_USER_AGENT: &str = "myplace-sync/0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Csv,
    Sfmc,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

#[derive(Clone)]
pub struct MyPlaceConfig {
    pub api_key: String,
    pub base_url: String,
}

impl std::fmt::Debug for MyPlaceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MyPlaceConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub myplace: MyPlaceConfig,
    /// Present only when the marketing cloud sink is active.
    pub sfmc: Option<SfmcSettings>,
    pub http: HttpClientConfig,
}

impl SyncConfig {
    pub fn from_env(kind: SinkKind) -> Result<Self, ConfigError> {
        Self::from_lookup(kind, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup. Blank values count as missing, and every
    /// missing name for `kind` is reported at once.
    pub fn from_lookup<F>(kind: SinkKind, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut missing = Vec::new();
        let mut required = |key: &'static str| {
            let found = value(key);
            if found.is_none() {
                missing.push(key);
            }
            found.unwrap_or_default()
        };

        let api_key = required(MYPLACE_API_KEY);
        let sfmc = match kind {
            SinkKind::Csv => None,
            SinkKind::Sfmc => Some(SfmcSettings {
                client_id: required(SFMC_CLIENT_ID),
                client_secret: required(SFMC_CLIENT_SECRET),
                subdomain: required(SFMC_SUBDOMAIN),
                data_extension_key: required(SFMC_DATA_EXTENSION_KEY),
            }),
        };

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        Ok(Self {
            myplace: MyPlaceConfig {
                api_key,
                base_url: value(MYPLACE_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
            sfmc,
            http: HttpClientConfig {
                timeout: value(MYPLACE_HTTP_TIMEOUT_SECS)
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs),
                user_agent: Some(
                    value(MYPLACE_USER_AGENT).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                ),
            },
        })
    }
}
