use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::services::duplicate;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

/// Startup-fatal configuration problems. Admission decisions depend on the
/// QR signing secret, so the process refuses to serve without one rather
/// than failing every scan individually.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("QR_SIGNING_SECRET must be set before the server can adjudicate scans")]
    MissingQrSecret,

    #[error("DUPLICATE_WINDOW_MINUTES must be within [0, {max}], got {got}")]
    InvalidDuplicateWindow { got: i64, max: i64 },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    /// Process-wide HMAC key for ephemeral QR tokens.
    pub qr_secret: String,
    /// Maximum age of a QR token, in seconds.
    pub qr_freshness_secs: i64,
    /// Window the pipeline uses for duplicate-scan suppression.
    pub duplicate_window_minutes: i64,
    /// Validity span of offline cache entries.
    pub cache_duration_minutes: i64,
    /// Per-call budget for external store calls on the online scan path.
    pub store_timeout_ms: u64,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let qr_secret = env::var("QR_SIGNING_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingQrSecret)?;

        // The duplicate detector enforces the same bound per call; catching
        // a bad deployment value here stops it from failing every repeat
        // scan closed at runtime.
        let duplicate_window_minutes = env_or("DUPLICATE_WINDOW_MINUTES", 15);
        if !(0..=duplicate::MAX_WINDOW_MINUTES).contains(&duplicate_window_minutes) {
            return Err(ConfigError::InvalidDuplicateWindow {
                got: duplicate_window_minutes,
                max: duplicate::MAX_WINDOW_MINUTES,
            });
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/turnstile".to_string()),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            qr_secret,
            qr_freshness_secs: env_or("QR_FRESHNESS_SECS", 30),
            duplicate_window_minutes,
            cache_duration_minutes: env_or("CACHE_DURATION_MINUTES", 30),
            store_timeout_ms: env_or("STORE_TIMEOUT_MS", 2000),
            port: env_or("PORT", 3001),
        })
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Config: invalid value for {}, using default", key);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One sequential test: these scenarios share process-wide env vars
    // and would race each other as separate parallel tests.
    #[test]
    fn test_from_env_validation() {
        env::remove_var("QR_SIGNING_SECRET");
        env::remove_var("DUPLICATE_WINDOW_MINUTES");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingQrSecret)
        ));

        env::set_var("QR_SIGNING_SECRET", "   ");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingQrSecret)
        ));

        env::set_var("QR_SIGNING_SECRET", "config-test-secret");
        env::set_var("DUPLICATE_WINDOW_MINUTES", "2000");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidDuplicateWindow { got: 2000, .. })
        ));

        env::set_var("DUPLICATE_WINDOW_MINUTES", "-1");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidDuplicateWindow { got: -1, .. })
        ));

        env::set_var("DUPLICATE_WINDOW_MINUTES", "60");
        let config = Config::from_env().expect("valid configuration");
        assert_eq!(config.duplicate_window_minutes, 60);

        env::remove_var("DUPLICATE_WINDOW_MINUTES");
        env::remove_var("QR_SIGNING_SECRET");
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("TEST_TURNSTILE_WINDOW", "not-a-number");
        assert_eq!(env_or("TEST_TURNSTILE_WINDOW", 15i64), 15);
        env::remove_var("TEST_TURNSTILE_WINDOW");
    }
}
