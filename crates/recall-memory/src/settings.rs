//! Settings loading
//!
//! Layers, lowest priority first:
//! 1. Embedded defaults (`config/default.toml`)
//! 2. Optional `config/default`, `config/{RECALL_ENV}` and `config/local` files
//! 3. `RECALL_` environment variables (`RECALL_MEMORY__BACKEND=redis`)
//! 4. Flat overrides: `MEMORY_BACKEND`, `MEMORY_ENABLED`, `MEMORY_DB_PATH`,
//!    `MEMORY_SNAPSHOT_PATH`
//!
//! `REDIS_URL` is not read here; [`RedisSettings::connection_info`] consults
//! it at connect time when no explicit URL is configured.

use crate::error::Result;
use crate::types::{BackendRequest, DEFAULT_RECENT_LIMIT};
use config::{Config, Environment, File, FileFormat};
use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo, RedisResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Embedded default configuration (compiled into the library)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Default per-conversation capacity for both persistent backends
pub const DEFAULT_MAX_TURNS: usize = 10_000;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    /// Memory subsystem
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Log filter defaults
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "recall=info,recall_memory=info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Memory subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Whether calling code consults memory at all
    #[serde(default)]
    pub enabled: bool,

    /// `none`, `in_memory`, `redis`, `sqlite` or `persistent`
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Turns fetched from persistent backends on `load`
    #[serde(default = "default_load_limit")]
    pub load_limit: usize,

    /// File receiving the in-memory snapshot on every save/clear
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Redis backend settings
    #[serde(default)]
    pub redis: RedisSettings,

    /// SQLite backend settings
    #[serde(default)]
    pub sqlite: SqliteSettings,
}

fn default_backend() -> String {
    "none".to_string()
}

fn default_load_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: default_backend(),
            load_limit: default_load_limit(),
            snapshot_path: None,
            redis: RedisSettings::default(),
            sqlite: SqliteSettings::default(),
        }
    }
}

impl MemoryConfig {
    /// Normalized backend request.
    pub fn request(&self) -> BackendRequest {
        BackendRequest::parse(&self.backend)
    }
}

/// Redis connection and retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Full connection URL; takes precedence over host/port/db/password
    #[serde(default)]
    pub url: Option<String>,
    /// Server host
    #[serde(default = "default_redis_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// Logical database index
    #[serde(default)]
    pub db: i64,
    /// AUTH password
    #[serde(default)]
    pub password: Option<String>,
    /// Namespace prepended to every conversation key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Newest turns kept per conversation
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_key_prefix() -> String {
    "chat:".to_string()
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: None,
            key_prefix: default_key_prefix(),
            max_turns: default_max_turns(),
        }
    }
}

impl RedisSettings {
    /// Settings pointing at an explicit URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Where to connect: explicit URL, then `REDIS_URL`, then host/port/db/password.
    pub fn connection_info(&self) -> RedisResult<ConnectionInfo> {
        self.connection_info_with(env_value("REDIS_URL"))
    }

    /// The host/port/db/password fields are handed to the client as-is, so
    /// the password needs no URL escaping.
    fn connection_info_with(&self, env_url: Option<String>) -> RedisResult<ConnectionInfo> {
        let url = self
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .or(env_url);
        if let Some(url) = url {
            return url.into_connection_info();
        }

        let mut redis = RedisConnectionInfo::default().set_db(self.db);
        if let Some(password) = self.password.as_deref() {
            redis = redis.set_password(password);
        }
        Ok(ConnectionAddr::Tcp(self.host.clone(), self.port)
            .into_connection_info()?
            .set_redis_settings(redis))
    }
}

/// SQLite storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSettings {
    /// Database file; `:memory:` opens a private in-memory database
    #[serde(default = "default_sqlite_path")]
    pub path: PathBuf,
    /// Newest rows kept per session
    #[serde(default = "default_max_turns")]
    pub max_rows_per_session: usize,
    /// When false the schema is created but turns are served from RAM
    #[serde(default = "default_persist")]
    pub persist: bool,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("data/memory.sqlite")
}

fn default_persist() -> bool {
    true
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
            max_rows_per_session: default_max_turns(),
            persist: default_persist(),
        }
    }
}

impl SqliteSettings {
    /// Settings for a database at `path` with default retention.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Load settings from embedded defaults, config files and environment.
pub fn load_settings() -> Result<AppSettings> {
    let env_name = std::env::var("RECALL_ENV").unwrap_or_else(|_| "development".to_string());

    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{env_name}")).required(false))
        .add_source(File::with_name("config/local").required(false))
        // prefix_separator("_") so RECALL_MEMORY__BACKEND maps to memory.backend
        .add_source(
            Environment::with_prefix("RECALL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("memory.backend", env_value("MEMORY_BACKEND"))?
        .set_override_option("memory.enabled", env_bool("MEMORY_ENABLED"))?
        .set_override_option("memory.sqlite.path", env_value("MEMORY_DB_PATH"))?
        .set_override_option("memory.snapshot_path", env_value("MEMORY_SNAPSHOT_PATH"))?
        .build()?;

    let settings: AppSettings = config.try_deserialize()?;
    tracing::debug!(
        backend = %settings.memory.backend,
        enabled = settings.memory.enabled,
        "Settings loaded"
    );
    Ok(settings)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
    env_value(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}
