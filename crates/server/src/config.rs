use std::{str::FromStr, time::Duration};

use services::services::shift::{DEFAULT_GRID_SHIFTS, MAX_GRID_SHIFTS};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Server settings, read from the environment (and `.env` via dotenvy in `main`).
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Shifts shown by the shift table when the request does not ask for a size.
    pub shift_grid_size: usize,
    /// Keep the board's clock rolling forward with real time.
    pub follow_clock: bool,
    pub clock_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            database_url: "sqlite://production.db".to_string(),
            shift_grid_size: DEFAULT_GRID_SHIFTS,
            follow_clock: false,
            clock_interval: Duration::from_secs(60),
        }
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = parse("PORT", port)?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(size) = lookup("SHIFT_GRID_SIZE") {
            let parsed: usize = parse("SHIFT_GRID_SIZE", size.clone())?;
            if parsed == 0 || parsed > MAX_GRID_SHIFTS {
                return Err(ConfigError::Invalid {
                    key: "SHIFT_GRID_SIZE",
                    value: size,
                    reason: format!("must be between 1 and {MAX_GRID_SHIFTS}"),
                });
            }
            config.shift_grid_size = parsed;
        }
        if let Some(follow) = lookup("SHIFT_CLOCK_FOLLOW") {
            config.follow_clock = parse("SHIFT_CLOCK_FOLLOW", follow)?;
        }
        if let Some(secs) = lookup("SHIFT_CLOCK_INTERVAL_SECS") {
            let secs: u64 = parse("SHIFT_CLOCK_INTERVAL_SECS", secs)?;
            config.clock_interval = Duration::from_secs(secs.max(1));
        }
        Ok(config)
    }
}
