//! Environment-variable configuration loading.
//!
//! This is deliberately the one module the event loop never reaches into
//! directly — it is an external collaborator the core consumes, not part
//! of the tightly coupled batching loop. `load()` does all the env
//! parsing, defaulting, and logging up front and hands the rest of the
//! process an immutable [`Config`].

use crate::errors::ConfigError;
use crate::signer::SigningKey;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_DB_CHANNEL_NAME: &str = "token_insert";
const DEFAULT_DB_QUEUE_NAME: &str = "user_action_queue";
const DEFAULT_BATCH_LIMIT: i64 = 10;
const DEFAULT_BATCH_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_HEALTHCHECK_INTERVAL_MS: u64 = 270_000;

/// `secret_key` is a [`SigningKey`], not a bare `[u8; 32]`: it zeroizes on
/// drop and its `Debug` impl redacts the bytes, so the derived `Debug`
/// below never leaks the key even if `Config` is logged wholesale.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub secret_key: SigningKey,
    pub db_channel_name: String,
    pub db_queue_name: String,
    pub batch_limit: i64,
    pub batch_timeout: Duration,
    pub healthcheck_interval: Duration,
}

/// Loads configuration from the process environment.
///
/// Missing/malformed `DATABASE_URL` or `SECRET_KEY` are fatal; every other
/// variable falls back to its default with a logged warning on an invalid
/// or out-of-range value.
pub fn load() -> Result<Config, ConfigError> {
    let database_url =
        env::var("DATABASE_URL").map_err(|_| ConfigError::MissingRequired("DATABASE_URL"))?;

    let secret_key_hex =
        env::var("SECRET_KEY").map_err(|_| ConfigError::MissingRequired("SECRET_KEY"))?;
    let secret_key = parse_secret_key(&secret_key_hex)?;

    let db_channel_name = env::var("DB_CHANNEL_NAME").unwrap_or_else(|_| {
        info!(
            default = DEFAULT_DB_CHANNEL_NAME,
            "DB_CHANNEL_NAME not set, using default"
        );
        DEFAULT_DB_CHANNEL_NAME.to_owned()
    });

    let db_queue_name = env::var("DB_QUEUE_NAME").unwrap_or_else(|_| {
        info!(
            default = DEFAULT_DB_QUEUE_NAME,
            "DB_QUEUE_NAME not set, using default"
        );
        DEFAULT_DB_QUEUE_NAME.to_owned()
    });

    let batch_limit = parse_env_i64("BATCH_LIMIT", DEFAULT_BATCH_LIMIT);
    let batch_timeout_ms = parse_env_u64("BATCH_TIMEOUT", DEFAULT_BATCH_TIMEOUT_MS);
    let mut healthcheck_interval_ms =
        parse_env_u64("HEALTHCHECK_INTERVAL", DEFAULT_HEALTHCHECK_INTERVAL_MS);

    if healthcheck_interval_ms < batch_timeout_ms {
        warn!(
            healthcheck_interval_ms,
            batch_timeout_ms,
            "HEALTHCHECK_INTERVAL must be >= BATCH_TIMEOUT; clamping up"
        );
        healthcheck_interval_ms = batch_timeout_ms;
    }

    info!(
        db_channel_name = %db_channel_name,
        db_queue_name = %db_queue_name,
        batch_limit,
        batch_timeout_ms,
        healthcheck_interval_ms,
        "configuration resolved"
    );

    Ok(Config {
        database_url,
        secret_key,
        db_channel_name,
        db_queue_name,
        batch_limit,
        batch_timeout: Duration::from_millis(batch_timeout_ms),
        healthcheck_interval: Duration::from_millis(healthcheck_interval_ms),
    })
}

fn parse_secret_key(hex_str: &str) -> Result<SigningKey, ConfigError> {
    if hex_str.len() != 64 {
        return Err(ConfigError::InvalidSecretKey);
    }
    let mut key = [0u8; 32];
    hex::decode_to_slice(hex_str, &mut key).map_err(|_| ConfigError::InvalidSecretKey)?;
    Ok(SigningKey::new(key))
}

fn parse_env_i64(name: &str, default: i64) -> i64 {
    match env::var(name) {
        Err(_) => {
            info!(%name, default, "not set, using default");
            default
        }
        Ok(val) => match val.parse::<i64>() {
            Ok(n) => n,
            Err(_) => {
                warn!(%name, value = %val, default, "invalid value, using default");
                default
            }
        },
    }
}

fn parse_env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Err(_) => {
            info!(%name, default, "not set, using default");
            default
        }
        Ok(val) => match val.parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                warn!(%name, value = %val, default, "invalid value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_key_must_be_64_hex_chars() {
        assert!(parse_secret_key("not-hex").is_err());
        assert!(parse_secret_key(&"aa".repeat(31)).is_err());
        assert!(parse_secret_key(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn secret_key_decodes_correctly() {
        let key = parse_secret_key(&"ab".repeat(32)).unwrap();
        assert_eq!(key.as_bytes(), &[0xabu8; 32]);
    }

    #[test]
    fn parse_env_i64_falls_back_on_missing_or_invalid() {
        assert_eq!(parse_env_i64("TOKEN_SIDECAR_TEST_UNSET_INT", 10), 10);
    }
}
