use crate::{
    config::{BackendKind, StorageConfig, get_storage_root},
    error::{ConnectionError, Result},
    storage::backend::{LocalBackend, ShareBackend, StorageBackend, resolve_under},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::FileTimes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// One entry directly under a listed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// File-store client rooted at a single base directory.
///
/// Every remote path is relative to the root (or to a share under it).
#[derive(Debug)]
pub struct DfsClient {
    backend: Box<dyn StorageBackend>,
}

impl DfsClient {
    /// Open a local store at `root`, or at `DFS_ROOT` / the default root when `None`.
    pub async fn new(root: Option<PathBuf>) -> Result<Self> {
        let root = root.unwrap_or_else(get_storage_root);
        Self::with_backend(Box::new(LocalBackend::new(root))).await
    }

    /// Open the backend selected by `config`
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let backend: Box<dyn StorageBackend> = match config.backend {
            BackendKind::Local => Box::new(LocalBackend::new(&config.root)),
            BackendKind::Share => {
                Box::new(ShareBackend::new(&config.root, config.default_share.clone()))
            },
        };
        Self::with_backend(backend).await
    }

    pub async fn with_backend(backend: Box<dyn StorageBackend>) -> Result<Self> {
        backend.prepare().await?;
        info!(root = %backend.root().display(), backend = ?backend.kind(), "Storage client ready");
        Ok(Self { backend })
    }

    pub fn root(&self) -> &Path {
        self.backend.root()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Full path of `remote` inside `share`
    pub fn resolve(&self, share: &str, remote: impl AsRef<Path>) -> Result<PathBuf> {
        let base = self.backend.share_dir(share)?;
        Ok(resolve_under(&base, remote.as_ref())?)
    }

    /// Copy a local file to `root/remote`, creating intermediate directories.
    /// Returns the stored path.
    pub async fn upload_file(
        &self,
        local: impl AsRef<Path>,
        remote: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        self.write("", remote, local).await
    }

    /// Copy `root/remote` to `local`, or to the remote file name in the working
    /// directory when `local` is `None`. Returns the local path written.
    pub async fn download_file(
        &self,
        remote: impl AsRef<Path>,
        local: Option<&Path>,
    ) -> Result<PathBuf> {
        let remote = remote.as_ref();
        let target = match local {
            Some(local) => local.to_path_buf(),
            None => {
                let cwd = std::env::current_dir()
                    .map_err(|e| ConnectionError::storage("reading working directory", ".", e))?;
                default_download_target(remote, &cwd)?
            },
        };
        self.read("", remote, &target).await
    }

    /// Store a local file at `remote` inside `share`
    pub async fn write(
        &self,
        share: &str,
        remote: impl AsRef<Path>,
        local: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let remote = remote.as_ref();
        require_file_name(remote)?;
        let target = self.resolve(share, remote)?;

        debug!(from = %local.as_ref().display(), to = %target.display(), "Uploading file");
        copy_preserving(local.as_ref(), &target, "uploading file").await?;
        Ok(target)
    }

    /// Retrieve `remote` from `share` into the local path
    pub async fn read(
        &self,
        share: &str,
        remote: impl AsRef<Path>,
        local: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let remote = remote.as_ref();
        require_file_name(remote)?;
        let source = self.resolve(share, remote)?;
        let local = local.as_ref();

        debug!(from = %source.display(), to = %local.display(), "Downloading file");
        copy_preserving(&source, local, "downloading file").await?;
        Ok(local.to_path_buf())
    }

    /// Create a directory (and any missing parents) inside `share`
    pub async fn create_directory(&self, share: &str, path: impl AsRef<Path>) -> Result<PathBuf> {
        let target = self.resolve(share, path)?;
        fs::create_dir_all(&target)
            .await
            .map_err(|e| ConnectionError::storage("creating directory", &target, e))?;
        debug!(path = %target.display(), "Created directory");
        Ok(target)
    }

    /// Full paths of the entries directly under `path`, sorted by name
    pub async fn list_files(&self, share: &str, path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        Ok(self.list_entries(share, path).await?.into_iter().map(|entry| entry.path).collect())
    }

    /// Entry records directly under `path`, sorted by name
    pub async fn list_entries(&self, share: &str, path: impl AsRef<Path>) -> Result<Vec<Entry>> {
        let dir = self.resolve(share, path)?;
        Ok(read_entries(&dir).await?)
    }

    /// Mirror the tree under `remote_root` into `local_dir`.
    ///
    /// Directories are created locally before their contents are copied. The first
    /// failing entry aborts the whole copy. Returns the number of files copied.
    pub async fn read_folder(
        &self,
        share: &str,
        remote_root: impl AsRef<Path>,
        local_dir: impl AsRef<Path>,
    ) -> Result<usize> {
        let source_root = self.resolve(share, remote_root)?;
        let local_dir = local_dir.as_ref();
        fs::create_dir_all(local_dir)
            .await
            .map_err(|e| ConnectionError::storage("creating local directory", local_dir, e))?;

        let mut pending = vec![(source_root, local_dir.to_path_buf())];
        let mut copied = 0;

        while let Some((source, target)) = pending.pop() {
            for entry in read_entries(&source).await? {
                let destination = target.join(&entry.name);
                if entry.is_dir {
                    fs::create_dir_all(&destination).await.map_err(|e| {
                        ConnectionError::storage("creating local directory", &destination, e)
                    })?;
                    pending.push((entry.path, destination));
                } else {
                    copy_preserving(&entry.path, &destination, "mirroring file").await?;
                    copied += 1;
                }
            }
        }

        info!(files = copied, into = %local_dir.display(), "Mirrored remote folder");
        Ok(copied)
    }
}

fn require_file_name(remote: &Path) -> std::result::Result<(), ConnectionError> {
    if remote.file_name().is_none() {
        return Err(ConnectionError::InvalidPath(format!(
            "'{}' does not name a file",
            remote.display()
        )));
    }
    Ok(())
}

/// Where a download lands when the caller names no destination
fn default_download_target(
    remote: &Path,
    cwd: &Path,
) -> std::result::Result<PathBuf, ConnectionError> {
    remote.file_name().map(|name| cwd.join(name)).ok_or_else(|| {
        ConnectionError::InvalidPath(format!("'{}' does not name a file", remote.display()))
    })
}

/// Read a directory's entries. `.` and `..` are never reported.
async fn read_entries(dir: &Path) -> std::result::Result<Vec<Entry>, ConnectionError> {
    let list_err = |e: std::io::Error| ConnectionError::storage("listing directory", dir, e);

    let mut reader = fs::read_dir(dir).await.map_err(list_err)?;
    let mut entries = Vec::new();

    while let Some(dir_entry) = reader.next_entry().await.map_err(list_err)? {
        let path = dir_entry.path();
        let metadata = dir_entry
            .metadata()
            .await
            .map_err(|e| ConnectionError::storage("reading metadata", &path, e))?;

        entries.push(Entry {
            name: dir_entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            path,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Copy `source` to `target`, creating the target's parent directories and
/// carrying over permissions and access/modification times.
async fn copy_preserving(
    source: &Path,
    target: &Path,
    action: &str,
) -> std::result::Result<u64, ConnectionError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ConnectionError::storage(action, parent, e))?;
    }

    let metadata =
        fs::metadata(source).await.map_err(|e| ConnectionError::storage(action, source, e))?;
    let bytes = fs::copy(source, target).await.map_err(|e| ConnectionError::storage(action, source, e))?;

    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }

    let destination = target.to_path_buf();
    tokio::task::spawn_blocking(move || {
        // the copy may carry a read-only mode over, and futimens only needs ownership
        std::fs::File::open(&destination)?.set_times(times)
    })
    .await
    .map_err(std::io::Error::other)
    .and_then(|result| result)
    .map_err(|e| ConnectionError::storage("preserving timestamps", target, e))?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    async fn local_client(dir: &TempDir) -> DfsClient {
        DfsClient::new(Some(dir.path().join("root"))).await.unwrap()
    }

    #[tokio::test]
    async fn test_new_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;
        assert!(client.root().is_dir());
        assert_eq!(client.backend_kind(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_unwritable_root_is_connection_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file.txt");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = DfsClient::new(Some(blocker.join("root"))).await.unwrap_err();
        assert!(err.is_connection(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_upload_download_round_trip_preserves_mtime() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;

        let source = dir.path().join("test.txt");
        std::fs::write(&source, b"klad payload\n").unwrap();
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        std::fs::File::options().write(true).open(&source).unwrap().set_modified(old).unwrap();

        let stored = client.upload_file(&source, "demo/test_copy.txt").await.unwrap();
        assert_eq!(stored, client.root().join("demo/test_copy.txt"));

        let downloaded = dir.path().join("downloaded_test.txt");
        client.download_file("demo/test_copy.txt", Some(&downloaded)).await.unwrap();

        assert_eq!(std::fs::read(&downloaded).unwrap(), b"klad payload\n");
        assert_eq!(std::fs::metadata(&stored).unwrap().modified().unwrap(), old);
        assert_eq!(std::fs::metadata(&downloaded).unwrap().modified().unwrap(), old);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_source_round_trip() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;

        let source = dir.path().join("ro.txt");
        std::fs::write(&source, b"frozen").unwrap();
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        std::fs::File::options().write(true).open(&source).unwrap().set_modified(old).unwrap();
        std::fs::set_permissions(&source, std::fs::Permissions::from_mode(0o444)).unwrap();

        let stored = client.upload_file(&source, "ro.txt").await.unwrap();
        assert_eq!(std::fs::metadata(&stored).unwrap().permissions().mode() & 0o777, 0o444);
        assert_eq!(std::fs::metadata(&stored).unwrap().modified().unwrap(), old);

        let downloaded = dir.path().join("ro_copy.txt");
        client.download_file("ro.txt", Some(&downloaded)).await.unwrap();
        assert_eq!(std::fs::read(&downloaded).unwrap(), b"frozen");
        assert_eq!(std::fs::metadata(&downloaded).unwrap().modified().unwrap(), old);
    }

    #[tokio::test]
    async fn test_missing_local_file_is_connection_error() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;

        let err = client.upload_file(dir.path().join("absent.txt"), "x.txt").await.unwrap_err();
        assert!(err.is_connection());
        assert!(err.to_string().contains("uploading file"));
    }

    #[tokio::test]
    async fn test_remote_path_cannot_escape_root() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"a").unwrap();

        let err = client.upload_file(&source, "../outside.txt").await.unwrap_err();
        assert!(matches!(err, crate::Error::Connection(ConnectionError::InvalidPath(_))));
        assert!(!dir.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn test_absolute_remote_path_is_relative_to_root() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"a").unwrap();

        let stored = client.upload_file(&source, "/nested/a.txt").await.unwrap();
        assert!(stored.starts_with(client.root()));
        assert!(client.root().join("nested/a.txt").is_file());
    }

    #[test]
    fn test_default_download_target_uses_base_name() {
        let target =
            default_download_target(Path::new("demo/test_copy.txt"), Path::new("/work")).unwrap();
        assert_eq!(target, PathBuf::from("/work/test_copy.txt"));
        assert!(default_download_target(Path::new(""), Path::new("/work")).is_err());
    }

    #[tokio::test]
    async fn test_list_and_create_directory() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;

        client.create_directory("", "reports/2024/q1").await.unwrap();
        client.create_directory("", "reports/2024/q2").await.unwrap();
        std::fs::write(client.root().join("reports/2024/summary.csv"), b"a,b\n").unwrap();

        let files = client.list_files("", "reports/2024").await.unwrap();
        let root = client.root().join("reports/2024");
        assert_eq!(files, vec![root.join("q1"), root.join("q2"), root.join("summary.csv")]);

        let entries = client.list_entries("", "reports/2024").await.unwrap();
        assert!(entries[0].is_dir);
        assert!(!entries[2].is_dir);
        assert_eq!(entries[2].size, 4);
        assert!(entries[2].modified.is_some());
    }

    #[tokio::test]
    async fn test_create_directory_failure_raises() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;
        std::fs::write(client.root().join("occupied"), b"file").unwrap();

        let err = client.create_directory("", "occupied/child").await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_share_qualified_write_and_read() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;
        let source = dir.path().join("in.bin");
        std::fs::write(&source, [0u8, 1, 2, 3]).unwrap();

        let stored = client.write("finance", "ledger/in.bin", &source).await.unwrap();
        assert_eq!(stored, client.root().join("finance/ledger/in.bin"));

        let out = dir.path().join("out.bin");
        client.read("finance", "ledger/in.bin", &out).await.unwrap();
        assert_eq!(std::fs::read(out).unwrap(), vec![0u8, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_read_folder_mirrors_tree() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;
        std::fs::create_dir_all(client.root().join("a/b")).unwrap();
        std::fs::create_dir_all(client.root().join("a/c/empty")).unwrap();
        std::fs::write(client.root().join("a/b/file1"), b"one").unwrap();
        std::fs::write(client.root().join("a/c/file2"), b"two").unwrap();

        let local = dir.path().join("L");
        let copied = client.read_folder("", "a", &local).await.unwrap();

        assert_eq!(copied, 2);
        assert_eq!(std::fs::read(local.join("b/file1")).unwrap(), b"one");
        assert_eq!(std::fs::read(local.join("c/file2")).unwrap(), b"two");
        assert!(local.join("c/empty").is_dir());
    }

    #[tokio::test]
    async fn test_read_folder_missing_remote_fails() {
        let dir = TempDir::new().unwrap();
        let client = local_client(&dir).await;

        let err = client.read_folder("", "nope", dir.path().join("L")).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_from_config_share_backend() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("common")).unwrap();
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            backend: BackendKind::Share,
            default_share: Some("common".into()),
        };

        let client = DfsClient::from_config(&config).await.unwrap();
        assert_eq!(client.backend_kind(), BackendKind::Share);
        assert_eq!(client.resolve("", "x.txt").unwrap(), dir.path().join("common/x.txt"));
    }
}
