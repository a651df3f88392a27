//! Configuration management
//!
//! Settings come from an INI file (`[server]`, `[auth]`, `[dump]` sections)
//! and can be overridden with `TDB_`-prefixed environment variables using
//! `__` between section and key, e.g. `TDB_SERVER__PORT=9000`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "./config.ini";

/// Default data source: a private in-memory database.
pub const DEFAULT_DSN: &str = ":memory:";

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default process tag shown in startup logs.
pub const DEFAULT_TAG: &str = "default";

/// Default request timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Default time granted to running ingestion at shutdown, in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 60;

/// Default number of requests served at once.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 200;

/// Default minutes between dumps of a table.
pub const DEFAULT_DUMP_INTERVAL_MINUTES: u64 = 15;

/// Default rows fetched per dump page.
pub const DEFAULT_DUMP_RECORD_COUNT: usize = 1000;

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "TDB";

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub dump: DumpConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
    pub dsn: String,
    pub tag: String,
    pub listen: String,
    pub port: u16,
    /// Request timeout, seconds
    pub read_timeout: u64,
    /// Grace period for ingestion at shutdown, seconds
    pub write_timeout: u64,
    /// Empty means no schema bootstrap (and therefore no data load)
    pub schemas_folder: String,
    /// Empty means no data load and no dumps
    pub data_folder: String,
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            dsn: DEFAULT_DSN.to_string(),
            tag: DEFAULT_TAG.to_string(),
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            write_timeout: DEFAULT_WRITE_TIMEOUT_SECS,
            schemas_folder: String::new(),
            data_folder: String::new(),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

impl ServerConfig {
    pub fn schemas_folder(&self) -> Option<PathBuf> {
        non_empty_path(&self.schemas_folder)
    }

    pub fn data_folder(&self) -> Option<PathBuf> {
        non_empty_path(&self.data_folder)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }
}

/// `[auth]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl AuthConfig {
    /// The token requests must present, if auth is enabled.
    pub fn required_token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// `[dump]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    pub interval_minutes: u64,
    pub record_count: usize,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_DUMP_INTERVAL_MINUTES,
            record_count: DEFAULT_DUMP_RECORD_COUNT,
        }
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

impl Config {
    /// Load `path` (must exist) plus environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Ini))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.server.dsn.trim().is_empty() {
            anyhow::bail!("Data source (dsn) cannot be empty");
        }

        if self.server.max_concurrent_requests == 0 {
            anyhow::bail!("max_concurrent_requests must be greater than 0");
        }

        if self.dump.interval_minutes == 0 {
            anyhow::bail!("Dump interval_minutes must be greater than 0");
        }

        if self.dump.record_count == 0 {
            anyhow::bail!("Dump record_count must be greater than 0");
        }

        if self.server.data_folder().is_some() && self.server.schemas_folder().is_none() {
            tracing::warn!("data_folder is set without schemas_folder - data will not be loaded");
        }

        Ok(())
    }
}
