use std::env;

use thiserror::Error;

use crate::modules::utils::time::parse_duration;
use crate::{PASSWORD_HASH_ROUNDS, RESET_TOKEN_DURATION};

/// HS256 secrets shorter than this are rejected
pub const MIN_SECRET_LENGTH: usize = 32;

const DEFAULT_JWT_EXPIRES_IN: u64 = 90 * 86400;
const DEFAULT_COOKIE_EXPIRES_IN: u64 = 90 * 86400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("JWT secret must be at least 32 bytes long")]
    SecretTooShort,
}

/// Process-wide authentication settings.
///
/// Built once at startup and shared read-only (usually behind an `Arc`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Session token lifetime in seconds
    pub jwt_expires_in: u64,
    /// Session cookie lifetime in seconds
    pub cookie_expires_in: u64,
    /// Marks the session cookie `Secure`
    pub production: bool,
    /// Reset token lifetime in seconds
    pub reset_token_ttl: u64,
    pub password_hash_rounds: u32,
}

impl AuthConfig {
    /// Create a configuration with default lifetimes for the given secret
    pub fn new(jwt_secret: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            jwt_secret: jwt_secret.into(),
            jwt_expires_in: DEFAULT_JWT_EXPIRES_IN,
            cookie_expires_in: DEFAULT_COOKIE_EXPIRES_IN,
            production: false,
            reset_token_ttl: RESET_TOKEN_DURATION,
            password_hash_rounds: PASSWORD_HASH_ROUNDS,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the environment.
    ///
    /// `JWT_COOKIE_EXPIRES_IN` is a number of minutes; `JWT_EXPIRES_IN`
    /// accepts a unit suffix (`90d`, `12h`, `30m`, `45s`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        let mut config = Self::new(secret)?;

        if let Ok(value) = env::var("JWT_EXPIRES_IN") {
            config.jwt_expires_in = parse_duration(&value).ok_or(ConfigError::Invalid {
                name: "JWT_EXPIRES_IN",
                value,
            })?;
        }

        if let Ok(value) = env::var("JWT_COOKIE_EXPIRES_IN") {
            let minutes = value.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "JWT_COOKIE_EXPIRES_IN",
                value: value.clone(),
            })?;
            config.cookie_expires_in = minutes.saturating_mul(60);
        }

        if let Ok(value) = env::var("PASSWORD_HASH_ROUNDS") {
            config.password_hash_rounds =
                value.trim().parse::<u32>().map_err(|_| ConfigError::Invalid {
                    name: "PASSWORD_HASH_ROUNDS",
                    value: value.clone(),
                })?;
        }

        config.production = env::var("APP_ENV")
            .map(|value| value.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::SecretTooShort);
        }
        if self.jwt_expires_in == 0 {
            return Err(ConfigError::Invalid {
                name: "JWT_EXPIRES_IN",
                value: "0".to_string(),
            });
        }
        if self.password_hash_rounds == 0 {
            return Err(ConfigError::Invalid {
                name: "PASSWORD_HASH_ROUNDS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
