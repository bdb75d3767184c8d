//! Klad Connector - PostgreSQL and file-store clients
//!
//! Two thin clients for downstream programs: [`PostgresClient`] runs SQL and moves
//! polars frames in and out of PostgreSQL, [`DfsClient`] copies files to and from a
//! storage root. Both are configured from the environment; call [`config::init`]
//! first to pick up a `.env` file.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{ConnectorConfig, get_connection_uri, get_storage_root};
pub use database::{ConnectionParams, PostgresClient, SqlValue, WriteMode};
pub use error::{ConfigError, ConnectionError, Error, Result};
pub use storage::DfsClient;
