//! Configuration Loader (C8): a single, validated load of the `SYNC_`
//! environment into a typed [`Config`], each field with a documented
//! default (SPEC_FULL.md section 6).

use crate::error::{Result, SyncError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Process-wide configuration, loaded once at startup and passed by
/// reference to every component that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub photos_base_path: PathBuf,
    pub initial_sync_on_startup: bool,
    pub periodic_sync_interval: Duration,
    pub event_debounce_delay: Duration,
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub health_check_port: u16,
    pub log_level: String,
    pub database_url: String,
}

impl Config {
    /// Loads configuration from the environment, applying defaults for any
    /// key that is absent. Fails fast if a present key cannot be parsed, or
    /// if the resulting configuration is otherwise invalid.
    pub fn load_from_env() -> Result<Self> {
        let photos_base_path =
            env_string("SYNC_PHOTOS_BASE_PATH", "/app/photos")?.into();
        let initial_sync_on_startup = env_bool("SYNC_INITIAL_SYNC_ON_STARTUP", true)?;
        let periodic_sync_interval =
            Duration::from_secs_f64(env_f64("SYNC_PERIODIC_SYNC_INTERVAL", 3600.0)?);
        let event_debounce_delay =
            Duration::from_secs_f64(env_f64("SYNC_EVENT_DEBOUNCE_DELAY", 2.0)?);
        let max_batch_size = env_usize("SYNC_MAX_BATCH_SIZE", 100)?;
        let batch_timeout = Duration::from_secs_f64(env_f64("SYNC_BATCH_TIMEOUT", 1.0)?);
        let retry_attempts = env_u32("SYNC_RETRY_ATTEMPTS", 3)?;
        let retry_delay = Duration::from_secs_f64(env_f64("SYNC_RETRY_DELAY", 5.0)?);
        let health_check_port = env_u16("SYNC_HEALTH_CHECK_PORT", 8001)?;
        let log_level = env_string("SYNC_LOG_LEVEL", "INFO")?;
        let database_url = database_url_from_env()?;

        let config = Self {
            photos_base_path,
            initial_sync_on_startup,
            periodic_sync_interval,
            event_debounce_delay,
            max_batch_size,
            batch_timeout,
            retry_attempts,
            retry_delay,
            health_check_port,
            log_level,
            database_url,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.photos_base_path.as_os_str().is_empty() {
            return Err(SyncError::Config(
                "SYNC_PHOTOS_BASE_PATH must not be empty".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(SyncError::Config(
                "SYNC_MAX_BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(SyncError::Config(
                "SYNC_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Prefers a single `DATABASE_URL`; falls back to assembling one from the
/// discrete `SYNC_DB_*` parts.
fn database_url_from_env() -> Result<String> {
    if let Ok(url) = env::var("DATABASE_URL") {
        if !url.trim().is_empty() {
            return Ok(url);
        }
    }

    let host = env_string("SYNC_DB_HOST", "localhost")?;
    let port = env_u16("SYNC_DB_PORT", 5432)?;
    let name = env_string("SYNC_DB_NAME", "photosync")?;
    let user = env_string("SYNC_DB_USER", "photosync")?;
    let password = env_string("SYNC_DB_PASSWORD", "photosync")?;
    Ok(format!(
        "postgres://{user}:{password}@{host}:{port}/{name}"
    ))
}

fn env_string(key: &str, default: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value),
        Err(env::VarError::NotPresent) => Ok(default.to_string()),
        Err(env::VarError::NotUnicode(_)) => {
            Err(SyncError::Config(format!("{key} is not valid UTF-8")))
        }
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<bool>()
            .map_err(|_| SyncError::Config(format!("{key}={value:?} is not a valid boolean"))),
        Err(_) => Ok(default),
    }
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<f64>()
            .map_err(|_| SyncError::Config(format!("{key}={value:?} is not a valid number"))),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map_err(|_| SyncError::Config(format!("{key}={value:?} is not a valid integer"))),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u32>()
            .map_err(|_| SyncError::Config(format!("{key}={value:?} is not a valid integer"))),
        Err(_) => Ok(default),
    }
}

fn env_u16(key: &str, default: u16) -> Result<u16> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u16>()
            .map_err(|_| SyncError::Config(format!("{key}={value:?} is not a valid port"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_env_is_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in [
            "SYNC_PHOTOS_BASE_PATH",
            "SYNC_MAX_BATCH_SIZE",
            "SYNC_RETRY_ATTEMPTS",
            "DATABASE_URL",
        ] {
            unsafe { env::remove_var(key) };
        }

        let config = Config::load_from_env().unwrap();
        assert_eq!(config.photos_base_path, PathBuf::from("/app/photos"));
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.retry_attempts, 3);
    }

    #[test]
    fn invalid_numeric_value_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { env::set_var("SYNC_MAX_BATCH_SIZE", "not-a-number") };
        let result = Config::load_from_env();
        unsafe { env::remove_var("SYNC_MAX_BATCH_SIZE") };
        assert!(result.is_err());
    }

    #[test]
    fn zero_max_batch_size_fails_validation() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { env::set_var("SYNC_MAX_BATCH_SIZE", "0") };
        let result = Config::load_from_env();
        unsafe { env::remove_var("SYNC_MAX_BATCH_SIZE") };
        assert!(result.is_err());
    }
}
