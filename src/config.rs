//! Store settings from the environment (or any JSON/serde source).

use crate::error::ConfigError;
use crate::service::{StoreOptions, DEFAULT_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl StoreConfig {
    /// `DATABASE_URL`, `STORE_TABLE` (required), `STORE_SCHEMA`, `STORE_BATCH_SIZE`,
    /// `STORE_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let config = StoreConfig {
            database_url: required("DATABASE_URL")?,
            schema: lookup("STORE_SCHEMA")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(default_schema),
            table: required("STORE_TABLE")?,
            batch_size: parse_or("STORE_BATCH_SIZE", lookup("STORE_BATCH_SIZE"), DEFAULT_BATCH_SIZE)?,
            max_connections: parse_or(
                "STORE_MAX_CONNECTIONS",
                lookup("STORE_MAX_CONNECTIONS"),
                DEFAULT_MAX_CONNECTIONS,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::Missing("STORE_TABLE"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "STORE_BATCH_SIZE",
                message: "must be greater than 0".into(),
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "STORE_MAX_CONNECTIONS",
                message: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            batch_size: self.batch_size,
        }
    }

    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: format!("{:?}: {}", v, e),
        }),
    }
}
