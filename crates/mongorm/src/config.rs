//! Connection configuration
//!
//! # Example
//! ```rust,ignore
//! use mongorm::MongormConfig;
//!
//! // From environment
//! let config = MongormConfig::from_env()?;
//!
//! // Or explicit configuration
//! let config = MongormConfig::new("mongodb://localhost:27017/app")
//!     .timezone("Asia/Shanghai");
//! ```

use crate::Result;
use mongorm_common::MongormError;
use serde::Deserialize;
use std::time::Duration;

/// Connection pool configuration, applied on top of the URI's own options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool
    pub max_pool_size: Option<u32>,
    pub max_idle_time: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: None,
            max_pool_size: Some(10),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("mongorm".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MongormConfig {
    pub uri: String,
    /// Used when the URI names no database
    #[serde(default)]
    pub dbname: Option<String>,
    /// IANA name; overrides every schema's timezone
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl MongormConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            dbname: None,
            timezone: None,
            pool: PoolConfig::default(),
        }
    }

    pub fn dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// - `MONGODB_URI` (required)
    /// - `MONGODB_DBNAME`
    /// - `TIMEZONE`
    /// - `MONGODB_APP_NAME`
    /// - `MONGODB_MIN_POOL_SIZE`, `MONGODB_MAX_POOL_SIZE`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`MongormConfig::from_env`] with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let uri = lookup("MONGODB_URI")
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| MongormError::Configuration("MONGODB_URI is not set".to_string()))?;

        let mut pool = PoolConfig::default();
        if let Some(app_name) = lookup("MONGODB_APP_NAME") {
            pool.app_name = Some(app_name);
        }
        if let Some(min) = parse_var(&lookup, "MONGODB_MIN_POOL_SIZE")? {
            pool.min_pool_size = Some(min);
        }
        if let Some(max) = parse_var(&lookup, "MONGODB_MAX_POOL_SIZE")? {
            pool.max_pool_size = Some(max);
        }

        Ok(Self {
            uri,
            dbname: lookup("MONGODB_DBNAME").filter(|s| !s.is_empty()),
            timezone: lookup("TIMEZONE").filter(|s| !s.is_empty()),
            pool,
        })
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u32>> {
    lookup(name)
        .map(|value| {
            value.trim().parse::<u32>().map_err(|_| {
                MongormError::Configuration(format!("{} must be a number, got '{}'", name, value))
            })
        })
        .transpose()
}
