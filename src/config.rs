//! Configuration management for the connector
//!
//! Connection URIs are resolved per profile from `PG_<PROFILE>_URI` and the storage
//! root from `DFS_ROOT`. Tunables live in [`ConnectorConfig`], layered from defaults,
//! an optional TOML file and `KLAD_`-prefixed environment variables.
use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage root used when `DFS_ROOT` is not set
pub const DEFAULT_STORAGE_ROOT: &str = "/home/default/persistent";

/// Environment variable holding the storage root
pub const STORAGE_ROOT_VAR: &str = "DFS_ROOT";

/// Environment variable key holding the connection URI for `profile`.
pub fn connection_uri_key(profile: &str) -> String {
    format!("PG_{}_URI", profile.to_uppercase())
}

/// Load a `.env` file from the working directory or one of its parents.
///
/// Nothing is loaded until this is called. Returns the path of the loaded file,
/// or `None` when there is no file to load. Variables already present in the
/// process environment are left untouched.
pub fn init() -> Result<Option<PathBuf>, ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!("Loaded environment from {}", path.display());
            Ok(Some(path))
        },
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Dotenv(e.to_string())),
    }
}

/// Resolve the raw connection URI configured for `profile`.
///
/// The value is returned exactly as set. An unset or empty variable is an error
/// naming the key that was looked up.
pub fn get_connection_uri(profile: &str) -> Result<String, ConfigError> {
    let key = connection_uri_key(profile);
    match std::env::var(&key) {
        Ok(uri) if !uri.is_empty() => Ok(uri),
        Ok(_) | Err(std::env::VarError::NotPresent) => Err(ConfigError::MissingVar { key }),
        Err(std::env::VarError::NotUnicode(_)) => {
            Err(ConfigError::InvalidValue(format!("{} is not valid unicode", key)))
        },
    }
}

/// Resolve the storage root, falling back to [`DEFAULT_STORAGE_ROOT`].
pub fn get_storage_root() -> PathBuf {
    storage_root_or_default(std::env::var_os(STORAGE_ROOT_VAR))
}

fn storage_root_or_default(value: Option<std::ffi::OsString>) -> PathBuf {
    value.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT))
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Profile used to look up `PG_<PROFILE>_URI`
    pub profile: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { profile: "dev".to_string(), max_connections: 5, acquire_timeout_seconds: 30 }
    }
}

/// Which storage backend serves the root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Plain directory, created on demand
    #[default]
    Local,
    /// Remote share mounted under the root; the mount must already exist
    Share,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub backend: BackendKind,
    /// Share used when an operation names none (share backend only)
    #[serde(default)]
    pub default_share: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: get_storage_root(), backend: BackendKind::Local, default_share: None }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging format: "json" or "text"
    pub format: String,
    /// Default log level if no RUST_LOG is set
    pub default_level: String,
    /// Custom filter for dependency logs
    pub dependency_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            default_level: "info".to_string(),
            dependency_filter: Some("sqlx::query=warn".to_string()),
        }
    }
}

/// Connector configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectorConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl ConnectorConfig {
    /// Load configuration from defaults, an optional TOML file and the environment.
    ///
    /// Call [`init`] first if settings should be read from a `.env` file.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(ConnectorConfig::default()));

        // KLAD_CONFIG has to be read directly, it locates the file the rest comes from
        if let Some(config_path) = std::env::var_os("KLAD_CONFIG") {
            let path = Path::new(&config_path);
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment
            .merge(Env::prefixed("KLAD_").split("__"))
            .merge(legacy_storage_env())
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.profile.is_empty() {
            return Err(ConfigError::InvalidValue("database profile must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "database max_connections must be at least 1".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::InvalidValue(format!(
                "unknown logging format '{}'",
                self.logging.format
            )));
        }

        if self.storage.backend == BackendKind::Share
            && self.storage.default_share.as_deref().is_some_and(str::is_empty)
        {
            return Err(ConfigError::InvalidValue("default share must not be empty".into()));
        }

        Ok(())
    }
}

/// `DFS_ROOT`, `DFS_BACKEND` and `DFS_SHARE` predate the `KLAD_` settings and still win.
fn legacy_storage_env() -> Env {
    Env::raw().only(&["DFS_ROOT", "DFS_BACKEND", "DFS_SHARE"]).map(|key| {
        let key = key.as_str();
        if key.eq_ignore_ascii_case("DFS_ROOT") {
            "storage.root".into()
        } else if key.eq_ignore_ascii_case("DFS_BACKEND") {
            "storage.backend".into()
        } else if key.eq_ignore_ascii_case("DFS_SHARE") {
            "storage.default_share".into()
        } else {
            key.to_string().into()
        }
    })
}
