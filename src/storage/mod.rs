//! File-store client over a local directory or mounted remote shares
pub mod backend;
pub mod client;

pub use backend::{LocalBackend, ShareBackend, StorageBackend};
pub use client::{DfsClient, Entry};
