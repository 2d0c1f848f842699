//! Local filesystem object store.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use walkdir::WalkDir;

use super::{validate_key, ObjectStore};
use crate::error::{StoreError, StoreResult};

/// A repository rooted at a local directory.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Open a repository at `root`.
    ///
    /// The directory must already exist; a missing root is a
    /// connectivity-class error since nothing in it can be reached.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(Self { root }),
            Ok(_) => Err(StoreError::Connectivity(format!(
                "repository root is not a directory: {}",
                root.display()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::Connectivity(format!(
                "repository root does not exist: {}",
                root.display()
            ))),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn key_path(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn map_not_found(key: &str, e: std::io::Error) -> StoreError {
        if e.kind() == ErrorKind::NotFound {
            StoreError::NotFound(key.to_string())
        } else {
            StoreError::Io(e)
        }
    }

    async fn write_and_rename(temp_path: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
        {
            let mut file = fs::File::create(temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        fs::rename(temp_path, path).await
    }

    fn list_sync(kind_dir: &Path, kind: &str) -> StoreResult<Vec<String>> {
        if !kind_dir.is_dir() {
            return Err(StoreError::NotFound(kind.to_string()));
        }

        let mut identifiers = Vec::new();
        for entry in WalkDir::new(kind_dir).follow_links(false) {
            let entry = entry.map_err(|e| {
                StoreError::Io(std::io::Error::new(
                    ErrorKind::Other,
                    format!("failed to walk {}: {e}", kind_dir.display()),
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(kind_dir) else {
                continue;
            };
            let identifier = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            identifiers.push(identifier);
        }
        identifiers.sort();
        Ok(identifiers)
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, kind: &str) -> StoreResult<Vec<String>> {
        let kind_dir = self.key_path(kind)?;
        let kind = kind.to_string();
        tokio::task::spawn_blocking(move || Self::list_sync(&kind_dir, &kind))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))?
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let path = self.key_path(key)?;
        let data = fs::read(&path).await.map_err(|e| Self::map_not_found(key, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StoreResult<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write beside the target, then rename over it
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{file_name}.tmp-{}", std::process::id()));
        if let Err(e) = Self::write_and_rename(&temp_path, &path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.key_path(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| Self::map_not_found(key, e))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_missing_root_is_connectivity() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope");
        match FilesystemStore::open(&missing).await {
            Err(StoreError::Connectivity(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let temp = tempdir().unwrap();
        let store = FilesystemStore::open(temp.path()).await.unwrap();

        store
            .put("pkgsinfo/apps/Firefox.plist", Bytes::from_static(b"<plist/>"))
            .await
            .unwrap();
        store
            .put("pkgsinfo/Chrome.plist", Bytes::from_static(b"<plist/>"))
            .await
            .unwrap();

        let listed = store.list("pkgsinfo").await.unwrap();
        assert_eq!(listed, vec!["Chrome.plist", "apps/Firefox.plist"]);

        let data = store.get("pkgsinfo/apps/Firefox.plist").await.unwrap();
        assert_eq!(&data[..], b"<plist/>");

        store.delete("pkgsinfo/Chrome.plist").await.unwrap();
        assert!(store.get("pkgsinfo/Chrome.plist").await.unwrap_err().is_not_found());
        assert!(store.delete("pkgsinfo/Chrome.plist").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_failed_put_leaves_no_temp_file() {
        let temp = tempdir().unwrap();
        let store = FilesystemStore::open(temp.path()).await.unwrap();
        std::fs::create_dir_all(temp.path().join("catalogs/all")).unwrap();
        std::fs::write(temp.path().join("catalogs/all/occupied"), b"x").unwrap();

        let err = store
            .put("catalogs/all", Bytes::from_static(b"<plist/>"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("catalogs"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["all"]);
    }

    #[tokio::test]
    async fn test_missing_kind_lists_as_not_found() {
        let temp = tempdir().unwrap();
        let store = FilesystemStore::open(temp.path()).await.unwrap();
        assert!(store.list("icons").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let temp = tempdir().unwrap();
        let store = FilesystemStore::open(temp.path()).await.unwrap();
        match store.get("pkgs/../../etc/passwd").await {
            Err(StoreError::InvalidKey(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
