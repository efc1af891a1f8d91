use secrecy::{ExposeSecret, SecretString};

/// Host used when neither the caller nor the environment names one.
pub const DEFAULT_BASE_URL: &str = "eu-west-1.api.neuphonic.com";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Explicit settings supplied by the caller.
///
/// Every field that is `Some` wins over the environment and the defaults.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub jwt_token: Option<String>,
    pub base_http: Option<bool>,
}

/// Holds the connection settings shared by every transport of a client.
#[derive(Debug)]
pub struct ClientConfig {
    /// Host (and optional port) of the service, without scheme.
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub jwt_token: Option<SecretString>,
    /// Use `http`/`ws` instead of `https`/`wss`.
    pub base_http: bool,
}

impl ClientConfig {
    /// Loads configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(ConfigOverrides::default())
    }

    /// Merges explicit overrides on top of the environment and defaults.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let base_url = overrides
            .base_url
            .or_else(|| std::env::var("NEUPHONIC_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let api_key = overrides
            .api_key
            .or_else(|| std::env::var("NEUPHONIC_API_KEY").ok())
            .filter(|key| !key.is_empty());
        let jwt_token = overrides
            .jwt_token
            .or_else(|| std::env::var("NEUPHONIC_JWT_TOKEN").ok())
            .filter(|token| !token.is_empty());

        let base_http = match overrides.base_http {
            Some(flag) => flag,
            None => match std::env::var("NEUPHONIC_BASE_HTTP") {
                Ok(raw) => parse_flag(&raw).ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "NEUPHONIC_BASE_HTTP".to_string(),
                        format!("'{}' is not a boolean", raw),
                    )
                })?,
                Err(_) => false,
            },
        };

        if api_key.is_none() && jwt_token.is_none() {
            return Err(ConfigError::MissingVar(
                "NEUPHONIC_API_KEY or NEUPHONIC_JWT_TOKEN must be set".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            api_key: api_key.map(SecretString::from),
            jwt_token: jwt_token.map(SecretString::from),
            base_http,
        })
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|key| key.expose_secret())
    }

    pub fn jwt_token(&self) -> Option<&str> {
        self.jwt_token.as_ref().map(|token| token.expose_secret())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
