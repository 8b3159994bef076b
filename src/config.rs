use std::str::FromStr;

use thiserror::Error;

pub const FALLBACK_JWT_SECRET: &str = "fallback-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Per-provider HMAC secrets. A provider without a secret rejects every webhook.
#[derive(Debug, Clone, Default)]
pub struct WebhookSecrets {
    pub bca: Option<String>,
    pub mandiri: Option<String>,
    pub bni: Option<String>,
    pub qris: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expire_hours: i64,
    pub log_file: String,
    pub body_limit_bytes: usize,
    /// Argon2 memory cost in KiB.
    pub password_hash_memory_kib: u32,
    /// Chance that a status poll finds a pending payment paid.
    pub topup_settle_probability: f64,
    /// Accepted for any email that has not registered.
    pub demo_password: String,
    pub webhook_secrets: WebhookSecrets,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            jwt_secret: FALLBACK_JWT_SECRET.to_string(),
            jwt_expire_hours: 24 * 7,
            log_file: "app.log".to_string(),
            body_limit_bytes: 1024 * 1024,
            password_hash_memory_kib: argon2::Params::DEFAULT_M_COST,
            topup_settle_probability: 0.3,
            demo_password: "password123".to_string(),
            webhook_secrets: WebhookSecrets::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let jwt_secret = secret("JWT_SECRET").unwrap_or(defaults.jwt_secret);

        let topup_settle_probability: f64 =
            parse_or("TOPUP_SETTLE_PROBABILITY", defaults.topup_settle_probability)?;
        if !(0.0..=1.0).contains(&topup_settle_probability) {
            return Err(ConfigError::Invalid {
                key: "TOPUP_SETTLE_PROBABILITY",
                value: topup_settle_probability.to_string(),
            });
        }

        Ok(Self {
            port: parse_or("PORT", defaults.port)?,
            jwt_secret,
            jwt_expire_hours: parse_or("JWT_EXPIRE_HOURS", defaults.jwt_expire_hours)?,
            log_file: dotenv::var("LOG_FILE").unwrap_or(defaults.log_file),
            body_limit_bytes: parse_or("BODY_LIMIT_BYTES", defaults.body_limit_bytes)?,
            password_hash_memory_kib: parse_or(
                "PASSWORD_HASH_MEMORY_KIB",
                defaults.password_hash_memory_kib,
            )?,
            topup_settle_probability,
            demo_password: dotenv::var("DEMO_PASSWORD").unwrap_or(defaults.demo_password),
            webhook_secrets: WebhookSecrets {
                bca: secret("BCA_WEBHOOK_SECRET"),
                mandiri: secret("MANDIRI_WEBHOOK_SECRET"),
                bni: secret("BNI_WEBHOOK_SECRET"),
                qris: secret("QRIS_WEBHOOK_SECRET"),
            },
        })
    }

    pub fn uses_fallback_secret(&self) -> bool {
        self.jwt_secret == FALLBACK_JWT_SECRET
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match dotenv::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn secret(key: &str) -> Option<String> {
    dotenv::var(key).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.jwt_expire_hours, 168);
        assert_eq!(config.topup_settle_probability, 0.3);
        assert_eq!(config.demo_password, "password123");
        assert!(config.webhook_secrets.bca.is_none());
        assert!(config.uses_fallback_secret());
    }

    #[test]
    fn parse_or_falls_back_when_unset() {
        let value: u16 = parse_or("SIROY_TEST_UNSET_PORT", 8080).unwrap();
        assert_eq!(value, 8080);
    }
}
