use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Secret {0} not found in environment or /run/secrets")]
    MissingSecret(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub reset_code_ttl: chrono::Duration,
    pub cors_max_age: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let token_ttl_hours: i64 = try_load("TOKEN_TTL_HOURS", "720")?;
        let reset_code_ttl_secs: i64 = try_load("RESET_CODE_TTL_SECS", "600")?;
        let cors_max_age_secs: u64 = try_load("CORS_MAX_AGE_SECS", "3600")?;

        Ok(Self {
            port: try_load("RUST_PORT", "3000")?,
            redis_url: var("REDIS_URL"),
            jwt_secret: read_secret("JWT_SECRET")?,
            token_ttl: ttl("TOKEN_TTL_HOURS", token_ttl_hours, chrono::Duration::try_hours)?,
            reset_code_ttl: ttl(
                "RESET_CODE_TTL_SECS",
                reset_code_ttl_secs,
                chrono::Duration::try_seconds,
            )?,
            cors_max_age: Duration::from_secs(cors_max_age_secs),
        })
    }

    /// Defaults for everything but the signing secret. Uses the in-memory database.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            port: 3000,
            redis_url: None,
            jwt_secret: jwt_secret.into(),
            token_ttl: chrono::Duration::hours(720),
            reset_code_ttl: chrono::Duration::seconds(600),
            cors_max_age: Duration::from_secs(60 * 60),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}

/// Lifetimes must be positive and representable.
fn ttl(
    key: &'static str,
    value: i64,
    build: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    };

    if value <= 0 {
        return Err(invalid("must be greater than zero"));
    }

    build(value).ok_or_else(|| invalid("out of range"))
}

fn read_secret(secret_name: &'static str) -> Result<String, ConfigError> {
    if let Some(secret) = var(secret_name) {
        return Ok(secret.trim().to_string());
    }

    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
            ConfigError::MissingSecret(secret_name)
        })
}
