//! Client configuration read from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const API_URL_VAR: &str = "API_URL";
pub const GOOGLE_CLIENT_ID_VAR: &str = "GOOGLE_CLIENT_ID";
pub const ENVIRONMENT_VAR: &str = "APP_ENV";
pub const TIMEOUT_VAR: &str = "API_TIMEOUT_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{var} is not a valid URL: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("unknown environment `{0}` (expected production, development or staging)")]
    InvalidEnvironment(String),

    #[error("{var} must be a whole number of seconds, got `{value}`")]
    InvalidTimeout { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
    Staging,
}

impl Environment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Staging => "staging",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: Url,
    /// OAuth client id; `None` disables Google sign-in.
    pub google_client_id: Option<String>,
    pub environment: Environment,
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_url(API_URL_VAR, api_url)?,
            google_client_id: None,
            environment: Environment::default(),
            timeout: None,
        })
    }

    pub fn with_google_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.google_client_id = Some(client_id.into());
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_url = get(API_URL_VAR).ok_or(ConfigError::Missing(API_URL_VAR))?;
        let environment = match get(ENVIRONMENT_VAR) {
            Some(value) => value.parse()?,
            None => Environment::default(),
        };
        let timeout = match get(TIMEOUT_VAR) {
            Some(value) => Some(Duration::from_secs(value.trim().parse().map_err(|_| {
                ConfigError::InvalidTimeout {
                    var: TIMEOUT_VAR,
                    value: value.clone(),
                }
            })?)),
            None => None,
        };

        Ok(Self {
            api_url: parse_url(API_URL_VAR, &api_url)?,
            google_client_id: get(GOOGLE_CLIENT_ID_VAR),
            environment,
            timeout,
        })
    }

    pub fn google_enabled(&self) -> bool {
        self.google_client_id.is_some()
    }

    /// The API URL without a trailing slash, ready for path concatenation.
    pub fn base_url(&self) -> String {
        self.api_url.as_str().trim_end_matches('/').to_string()
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::InvalidUrl {
        var,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidUrl {
            var,
            reason: format!("unsupported scheme `{scheme}`"),
        }),
    }
}
