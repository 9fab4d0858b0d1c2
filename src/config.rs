// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Default number of timed tasks executed concurrently by one runner invocation.
pub const DEFAULT_RUNNER_WORKERS: usize = 4;

/// Default upper bound for a single timed task.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 60;

/// Default lifetime of an issued JWT (24 hours).
pub const DEFAULT_JWT_EXPIRATION: u64 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("failed to load configuration file: {0}")]
    File(#[from] dotenvy::Error),
}

/// Application configuration, loaded once at startup and passed around explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub log_dir: String,
    pub bind_addr: SocketAddr,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub runner_workers: usize,
    pub task_timeout: Duration,
}

impl Config {
    /// Loads the configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::read_env()
    }

    /// Loads the given dotenv-style file first, then reads the environment.
    ///
    /// Values already present in the environment win over the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::from_path(path)?;
        Self::read_env()
    }

    fn read_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let jwt_expiration = parsed("JWT_EXPIRATION", DEFAULT_JWT_EXPIRATION)?;
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
        let bind_addr = parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let runner_workers: usize = parsed("RUNNER_WORKERS", DEFAULT_RUNNER_WORKERS)?;
        if runner_workers == 0 {
            return Err(ConfigError::Invalid {
                name: "RUNNER_WORKERS",
                value: "0".to_string(),
            });
        }
        let task_timeout_secs = parsed("TASK_TIMEOUT_SECS", DEFAULT_TASK_TIMEOUT_SECS)?;

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            log_dir,
            bind_addr,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            runner_workers,
            task_timeout: Duration::from_secs(task_timeout_secs),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
