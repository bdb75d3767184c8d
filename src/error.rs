//! Global error types and error handling utilities

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors, raised only while resolving settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {key} not found")]
    MissingVar { key: String },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Failed to load .env file: {0}")]
    Dotenv(String),
}

/// Failures constructing a client handle or performing an operation through it.
///
/// Every variant carries the underlying library failure so its message ends up
/// in the rendered error text.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Database error while {action}: {source}")]
    Database {
        action: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Storage error while {action} '{}': {source}", path.display())]
    Storage {
        action: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Dataframe error while {action}: {source}")]
    Frame {
        action: String,
        #[source]
        source: polars::error::PolarsError,
    },

    #[error("Unsupported column type {type_name} for column '{column}'")]
    UnsupportedType { column: String, type_name: String },

    #[error("Invalid remote path: {0}")]
    InvalidPath(String),

    #[error("Invalid connection parameters: {0}")]
    InvalidParams(String),

    #[error("Table {0} already exists")]
    TableExists(String),
}

impl ConnectionError {
    pub fn database(action: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database { action: action.into(), source }
    }

    pub fn storage(
        action: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage { action: action.into(), path: path.into(), source }
    }

    pub fn frame(action: impl Into<String>, source: polars::error::PolarsError) -> Self {
        Self::Frame { action: action.into(), source }
    }
}

/// Base error for everything this crate does
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl Error {
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// Result type alias for connector operations
pub type Result<T> = std::result::Result<T, Error>;

/// Install `color-eyre` reports and a panic hook that records the panic in the log.
///
/// Panics also go to stderr so a failing `klad` run shows them even when logging
/// is sent to a JSON collector.
pub fn install_error_handlers() -> color_eyre::Result<()> {
    color_eyre::install()?;

    std::panic::set_hook(Box::new(|panic_info| {
        let message = panic_message(panic_info.payload());
        match panic_info.location() {
            Some(location) => {
                tracing::error!(
                    panic.file = location.file(),
                    panic.line = location.line(),
                    "klad panicked: {}",
                    message
                );
                eprintln!("klad panicked at {}:{}: {}", location.file(), location.line(), message);
            },
            None => {
                tracing::error!("klad panicked: {}", message);
                eprintln!("klad panicked: {}", message);
            },
        }
    }));

    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
