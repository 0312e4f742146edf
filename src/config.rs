// src/config.rs
use std::{env, fmt::Display, str::FromStr};

use http::HeaderName;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_PORT: &str = "3030";
const DEFAULT_MAX_CONNECTIONS: &str = "5";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub public_base_url: String,
    pub cors_allowed_origin: Option<String>,
    pub identity_header: HeaderName,
}

impl Config {
    /// Reads the process environment. `main` has already merged `.env` into it.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: try_load(
                    &lookup,
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_MAX_CONNECTIONS,
                )?,
            }),
            None => {
                warn!("DATABASE_URL not set, polls will be kept in memory only");
                None
            }
        };

        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            port: try_load(&lookup, "PORT", DEFAULT_PORT)?,
            database,
            public_base_url,
            cors_allowed_origin: lookup("CORS_ALLOWED_ORIGIN").filter(|o| !o.is_empty()),
            identity_header: try_load(&lookup, "IDENTITY_HEADER", DEFAULT_IDENTITY_HEADER)?,
        })
    }
}

fn try_load<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}
