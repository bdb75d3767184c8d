//! Database module for PostgreSQL interactions
pub mod client;
pub mod frame;
pub mod params;
pub mod value;

// Re-export most commonly used types
pub use client::{DatabaseConnectionInfo, PostgresClient};
pub use frame::WriteMode;
pub use params::{ConnectionParams, encode_component, mask_password};
pub use value::{PgKind, SqlRow, SqlValue};
