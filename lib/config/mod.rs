use std::env;
use std::net::SocketAddr;
use thiserror::Error;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_DB_POOL_MAX_SIZE: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for PORT: {0}")]
    InvalidPort(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),

    #[error("Invalid value for DB_POOL_MAX_SIZE: {0}")]
    InvalidPoolSize(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_url: String,
    pub bind_host: String,
    /// Default: 3000
    pub port: u16,
    /// Default: 16
    pub db_pool_max_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup so parsing can be tested
    /// without touching process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let bind_host = lookup("BIND_HOST").unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());

        let port = match lookup("PORT") {
            Some(val) => val
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(val))?,
            None => DEFAULT_PORT,
        };

        let db_pool_max_size = match lookup("DB_POOL_MAX_SIZE") {
            Some(val) => match val.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidPoolSize(val)),
            },
            None => DEFAULT_DB_POOL_MAX_SIZE,
        };

        Ok(Self {
            db_url,
            bind_host,
            port,
            db_pool_max_size,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_host, self.port);
        raw.parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddr(raw))
    }
}
