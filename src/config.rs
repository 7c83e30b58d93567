//! Connector configuration
//!
//! Loaded from a TOML file, overridden by `PG_ENTITLEMENTS_*` environment
//! variables, then validated before any connection is opened.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::client::ClientOptions;
use crate::cursor::DEFAULT_PAGE_SIZE;
use crate::error::{AccessError, AccessResult};
use crate::pool::PoolOptions;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "PG_ENTITLEMENTS_";

fn default_schemas() -> Vec<String> {
    vec!["public".to_string()]
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_connections() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Connector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Connection string, URL or key/value form
    #[serde(default)]
    pub dsn: String,
    /// Schemas whose objects are synced
    #[serde(default = "default_schemas")]
    pub schemas: Vec<String>,
    /// Sync table columns
    #[serde(default)]
    pub include_columns: bool,
    /// Sync large objects
    #[serde(default)]
    pub include_large_objects: bool,
    /// Sync every database instead of only the one the DSN names
    #[serde(default)]
    pub sync_all_databases: bool,
    /// Leave out functions in `pg_catalog` and `information_schema`
    #[serde(default)]
    pub skip_builtin_functions: bool,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Pooled connections per database
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Default `env_logger` filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            schemas: default_schemas(),
            include_columns: false,
            include_large_objects: false,
            sync_all_databases: false,
            skip_builtin_functions: false,
            page_size: default_page_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_connections: default_max_connections(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and
    /// validate.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> AccessResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Configuration from defaults plus the environment.
    pub fn from_env() -> AccessResult<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `PG_ENTITLEMENTS_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok());
    }

    /// Apply overrides from `lookup`, keyed by the unprefixed variable name.
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dsn) = lookup("DSN") {
            self.dsn = dsn;
        }
        if let Some(schemas) = lookup("SCHEMAS") {
            self.schemas = schemas
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }

        override_parsed(&lookup, "INCLUDE_COLUMNS", &mut self.include_columns);
        override_parsed(&lookup, "INCLUDE_LARGE_OBJECTS", &mut self.include_large_objects);
        override_parsed(&lookup, "SYNC_ALL_DATABASES", &mut self.sync_all_databases);
        override_parsed(&lookup, "SKIP_BUILTIN_FUNCTIONS", &mut self.skip_builtin_functions);
        override_parsed(&lookup, "PAGE_SIZE", &mut self.page_size);
        override_parsed(&lookup, "CONNECT_TIMEOUT_SECS", &mut self.connect_timeout_secs);
        override_parsed(&lookup, "MAX_CONNECTIONS", &mut self.max_connections);
    }

    /// Validate the configuration
    pub fn validate(&self) -> AccessResult<()> {
        if self.dsn.trim().is_empty() {
            return Err(AccessError::config("dsn must not be empty"));
        }
        self.dsn
            .parse::<tokio_postgres::Config>()
            .map_err(|err| AccessError::config(format!("invalid dsn: {err}")))?;

        if self.page_size == 0 {
            return Err(AccessError::config("page_size must be greater than 0"));
        }
        if self.schemas.is_empty() {
            return Err(AccessError::config("schemas must list at least one schema"));
        }
        if self.schemas.iter().any(|s| s.trim().is_empty()) {
            return Err(AccessError::config("schema names must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(AccessError::config("max_connections must be greater than 0"));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            client: ClientOptions {
                schemas: self.schemas.clone(),
                skip_builtin_functions: self.skip_builtin_functions,
                max_connections: self.max_connections,
            },
            connect_timeout: self.connect_timeout(),
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => log::warn!("ignoring {ENV_PREFIX}{key}={raw:?}: not a valid value"),
        }
    }
}
