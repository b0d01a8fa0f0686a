//! Local file store
//!
//! The peer's view of its served folder: enumerate relative file names,
//! open one for streaming, create one for a download.

use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};
use tracing::{debug, error, info, trace};

use crate::error::ShareError;
use crate::storage::digest::md5_stream;

/// Capability over a flat namespace of files rooted somewhere.
///
/// Names are relative, `/`-separated paths. Implementations must refuse
/// names that would escape the root.
#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    /// Readable, rewindable handle for serving a file
    type Reader: AsyncRead + AsyncSeek + Unpin + Send;
    /// Writable handle for a download destination
    type Writer: AsyncWrite + Unpin + Send;

    /// Every file currently in the store
    async fn list_files(&self) -> Result<Vec<String>>;

    /// Open an existing file for reading
    async fn open(&self, name: &str) -> Result<Self::Reader>;

    /// Create (or truncate) a file for writing
    async fn create(&self, name: &str) -> Result<Self::Writer>;

    /// Hex md5 of a stored file
    async fn checksum(&self, name: &str) -> Result<String> {
        let mut reader = self.open(name).await?;
        let (digest, _) = md5_stream(&mut reader).await?;
        Ok(digest)
    }
}

/// A [`FileStore`] backed by a directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative file name onto a path under the root
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        if name.is_empty() || relative.is_absolute() {
            return Err(ShareError::storage_error_with_path("Invalid file name", name).into());
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(ShareError::storage_error_with_path("File name escapes the served folder", name).into());
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for DirectoryStore {
    type Reader = File;
    type Writer = File;

    async fn list_files(&self) -> Result<Vec<String>> {
        debug!("Enumerating files under {}", self.root.display());
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(|e| {
                error!("Failed to read directory '{}': {}", dir.display(), e);
                ShareError::storage_error_full("Failed to read directory", dir.display().to_string(), e.to_string())
            })?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    let name = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/");
                    trace!("Found served file: {}", name);
                    files.push(name);
                }
            }
        }

        files.sort();
        info!("{} files under {}", files.len(), self.root.display());
        Ok(files)
    }

    async fn open(&self, name: &str) -> Result<File> {
        let path = self.resolve(name)?;
        File::open(&path).await.map_err(|e| {
            ShareError::storage_error_full("Failed to open file", path.display().to_string(), e.to_string()).into()
        })
    }

    async fn create(&self, name: &str) -> Result<File> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!("Creating directory: {}", parent.display());
                fs::create_dir_all(parent).await.map_err(|e| {
                    ShareError::storage_error_full("Failed to create directory", parent.display().to_string(), e.to_string())
                })?;
            }
        }
        File::create(&path).await.map_err(|e| {
            ShareError::storage_error_full("Failed to create file", path.display().to_string(), e.to_string()).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_list_files_is_relative_and_recursive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("nested/deeper/a.bin"), b"a").unwrap();

        let store = DirectoryStore::new(dir.path());
        let files = store.list_files().await.unwrap();
        assert_eq!(files, vec!["b.txt".to_string(), "nested/deeper/a.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_list_files_missing_root_fails() {
        let store = DirectoryStore::new("/definitely/not/a/real/folder");
        assert!(store.list_files().await.is_err());
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let store = DirectoryStore::new("/srv/share");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("a/../../b").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("").is_err());
        assert_eq!(store.resolve("docs/a.txt").unwrap(), PathBuf::from("/srv/share/docs/a.txt"));
    }

    #[tokio::test]
    async fn test_create_then_checksum() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());

        let mut file = store.create("sub/hello.txt").await.unwrap();
        file.write_all(b"hello world").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        assert_eq!(store.checksum("sub/hello.txt").await.unwrap(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert!(store.open("missing.txt").await.is_err());
    }
}
