//! Storage backends: where the root lives and how shares map onto it
use crate::config::BackendKind;
use crate::error::ConnectionError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Capability interface over the storage root
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Base path every remote path is resolved under
    fn root(&self) -> &Path;

    /// Make the root ready for use, failing when it cannot be reached
    async fn prepare(&self) -> Result<(), ConnectionError>;

    /// Directory a share name resolves to. The empty share means the backend default.
    fn share_dir(&self, share: &str) -> Result<PathBuf, ConnectionError>;
}

/// A plain directory, created on demand
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn prepare(&self) -> Result<(), ConnectionError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ConnectionError::storage("creating storage root", &self.root, e))?;
        ensure_listable(&self.root).await?;
        ensure_writable(&self.root).await
    }

    fn share_dir(&self, share: &str) -> Result<PathBuf, ConnectionError> {
        if share.is_empty() {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(validate_share(share)?))
    }
}

/// Remote shares mounted side by side under one directory, e.g. `/mnt/dfs/<share>`.
///
/// The mount is owned by the operating system, so a missing root is an error
/// rather than something to create.
#[derive(Debug, Clone)]
pub struct ShareBackend {
    mount_root: PathBuf,
    default_share: Option<String>,
}

impl ShareBackend {
    pub fn new(mount_root: impl Into<PathBuf>, default_share: Option<String>) -> Self {
        Self { mount_root: mount_root.into(), default_share }
    }
}

#[async_trait]
impl StorageBackend for ShareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Share
    }

    fn root(&self) -> &Path {
        &self.mount_root
    }

    async fn prepare(&self) -> Result<(), ConnectionError> {
        let metadata = fs::metadata(&self.mount_root)
            .await
            .map_err(|e| ConnectionError::storage("opening share mount", &self.mount_root, e))?;
        if !metadata.is_dir() {
            return Err(ConnectionError::storage(
                "opening share mount",
                &self.mount_root,
                std::io::Error::new(std::io::ErrorKind::NotADirectory, "mount root is not a directory"),
            ));
        }
        ensure_listable(&self.mount_root).await
    }

    fn share_dir(&self, share: &str) -> Result<PathBuf, ConnectionError> {
        let share = match (share, self.default_share.as_deref()) {
            ("", Some(default)) => default,
            ("", None) => {
                return Err(ConnectionError::InvalidPath(
                    "no share given and no default share configured".into(),
                ));
            },
            (share, _) => share,
        };
        Ok(self.mount_root.join(validate_share(share)?))
    }
}

async fn ensure_listable(root: &Path) -> Result<(), ConnectionError> {
    let _entries = fs::read_dir(root)
        .await
        .map_err(|e| ConnectionError::storage("opening storage root", root, e))?;
    debug!(root = %root.display(), "Storage root ready");
    Ok(())
}

/// Create and remove a scratch file so a read-only root fails up front
async fn ensure_writable(root: &Path) -> Result<(), ConnectionError> {
    let dir = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        tempfile::Builder::new().prefix(".klad-write-check").tempfile_in(&dir)?.close()
    })
    .await
    .map_err(std::io::Error::other)
    .and_then(|result| result)
    .map_err(|e| ConnectionError::storage("writing to storage root", root, e))
}

/// A share name must be exactly one plain path component
fn validate_share(share: &str) -> Result<&str, ConnectionError> {
    let mut components = Path::new(share).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(share),
        _ => Err(ConnectionError::InvalidPath(format!("invalid share name '{}'", share))),
    }
}

/// Join `remote` onto `base`, treating it as relative.
///
/// Leading separators and `.` are dropped; `..` is refused so a remote path can
/// never leave the base directory.
pub fn resolve_under(base: &Path, remote: &Path) -> Result<PathBuf, ConnectionError> {
    let mut resolved = base.to_path_buf();
    for component in remote.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {},
            Component::ParentDir => {
                return Err(ConnectionError::InvalidPath(format!(
                    "'{}' escapes the storage root",
                    remote.display()
                )));
            },
        }
    }
    Ok(resolved)
}
