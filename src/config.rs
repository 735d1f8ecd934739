use chrono::Utc;
use shuttle_runtime::SecretStore;
use std::{num::NonZeroU32, time::Duration};
use thiserror::Error;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 30;
const DEFAULT_DB_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RATE_LIMIT_PER_SECOND: i64 = 10;
const DEFAULT_RATE_LIMIT_BURST: i64 = 20;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} not found in secrets")]
    Missing(&'static str),

    #[error("{0} is set but empty")]
    Empty(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct B2Config {
    pub application_key_id: String,
    pub application_key: String,
    pub bucket_id: String,
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub database_url: String,
    pub b2: B2Config,
    pub cors_origin: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub db_timeout: Duration,
    pub rate_limit_per_second: NonZeroU32,
    pub rate_limit_burst: NonZeroU32,
}

impl AppConfig {
    pub fn from_secrets(secrets: &SecretStore) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| secrets.get(key))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            match lookup(key) {
                None => Err(ConfigError::Missing(key)),
                Some(value) if value.trim().is_empty() => Err(ConfigError::Empty(key)),
                Some(value) => Ok(value),
            }
        };

        let number = |key: &'static str, default: i64| -> Result<i64, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<i64>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(ConfigError::Invalid { key, value: raw }),
                },
            }
        };

        // A horizon must be representable and must not push token expiry past chrono's range.
        let horizon = |key: &'static str,
                       default: i64,
                       to_duration: fn(i64) -> Option<chrono::Duration>|
         -> Result<chrono::Duration, ConfigError> {
            let n = number(key, default)?;
            to_duration(n)
                .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
                .ok_or_else(|| ConfigError::Invalid {
                    key,
                    value: n.to_string(),
                })
        };

        let per_client = |key: &'static str, default: i64| -> Result<NonZeroU32, ConfigError> {
            let n = number(key, default)?;
            u32::try_from(n)
                .ok()
                .and_then(NonZeroU32::new)
                .ok_or_else(|| ConfigError::Invalid {
                    key,
                    value: n.to_string(),
                })
        };

        let db_timeout_secs = number("DB_TIMEOUT_SECS", DEFAULT_DB_TIMEOUT_SECS as i64)?;

        Ok(AppConfig {
            jwt_secret: required("JWT_SECRET")?,
            database_url: required("DATABASE_URL")?,
            b2: B2Config {
                application_key_id: required("B2_APPLICATION_KEY_ID")?,
                application_key: required("B2_APPLICATION_KEY")?,
                bucket_id: required("B2_BUCKET_ID")?,
            },
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string()),
            access_token_ttl: horizon(
                "ACCESS_TOKEN_TTL_MINUTES",
                DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
                chrono::Duration::try_minutes,
            )?,
            refresh_token_ttl: horizon(
                "REFRESH_TOKEN_TTL_DAYS",
                DEFAULT_REFRESH_TOKEN_TTL_DAYS,
                chrono::Duration::try_days,
            )?,
            db_timeout: Duration::from_secs(db_timeout_secs as u64),
            rate_limit_per_second: per_client(
                "RATE_LIMIT_PER_SECOND",
                DEFAULT_RATE_LIMIT_PER_SECOND,
            )?,
            rate_limit_burst: per_client("RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, String> {
        HashMap::from([
            ("JWT_SECRET", "s3cret".to_string()),
            ("DATABASE_URL", "postgres://localhost/jobly".to_string()),
            ("B2_APPLICATION_KEY_ID", "key-id".to_string()),
            ("B2_APPLICATION_KEY", "key".to_string()),
            ("B2_BUCKET_ID", "bucket".to_string()),
        ])
    }

    fn load(values: &HashMap<&'static str, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_optional_keys_are_absent() {
        let config = load(&base()).unwrap();
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.cors_origin, DEFAULT_CORS_ORIGIN);
        assert_eq!(config.access_token_ttl, chrono::Duration::minutes(15));
        assert_eq!(config.refresh_token_ttl, chrono::Duration::days(30));
        assert_eq!(config.db_timeout, Duration::from_secs(10));
        assert_eq!(config.rate_limit_per_second.get(), 10);
        assert_eq!(config.rate_limit_burst.get(), 20);
    }

    #[test]
    fn missing_signing_secret_fails_loudly() {
        let mut values = base();
        values.remove("JWT_SECRET");
        assert_eq!(load(&values).unwrap_err(), ConfigError::Missing("JWT_SECRET"));

        values.insert("JWT_SECRET", "  ".to_string());
        assert_eq!(load(&values).unwrap_err(), ConfigError::Empty("JWT_SECRET"));
    }

    #[test]
    fn numeric_overrides_are_validated() {
        let mut values = base();
        values.insert("ACCESS_TOKEN_TTL_MINUTES", "60".to_string());
        assert_eq!(
            load(&values).unwrap().access_token_ttl,
            chrono::Duration::minutes(60)
        );

        values.insert("DB_TIMEOUT_SECS", "soon".to_string());
        assert!(matches!(
            load(&values),
            Err(ConfigError::Invalid { key: "DB_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn out_of_range_token_horizons_are_rejected() {
        let mut values = base();
        values.insert("ACCESS_TOKEN_TTL_MINUTES", i64::MAX.to_string());
        assert!(matches!(
            load(&values),
            Err(ConfigError::Invalid { key: "ACCESS_TOKEN_TTL_MINUTES", .. })
        ));

        let mut values = base();
        values.insert("REFRESH_TOKEN_TTL_DAYS", "100000000".to_string());
        assert!(matches!(
            load(&values),
            Err(ConfigError::Invalid { key: "REFRESH_TOKEN_TTL_DAYS", .. })
        ));
    }

    #[test]
    fn rate_limit_must_fit_a_quota() {
        let mut values = base();
        values.insert("RATE_LIMIT_BURST", "5000000000".to_string());
        assert!(matches!(
            load(&values),
            Err(ConfigError::Invalid { key: "RATE_LIMIT_BURST", .. })
        ));

        let mut values = base();
        values.insert("RATE_LIMIT_PER_SECOND", "0".to_string());
        assert!(matches!(
            load(&values),
            Err(ConfigError::Invalid { key: "RATE_LIMIT_PER_SECOND", .. })
        ));
    }
}
