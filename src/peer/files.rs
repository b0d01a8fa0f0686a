//! Served file list
//!
//! Snapshot of the files a peer advertises, shared between the rescan and
//! the heartbeat.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::debug;

use crate::storage::FileStore;

/// Shared, replaceable list of served file names
#[derive(Debug, Clone, Default)]
pub struct ServedFiles {
    files: Arc<RwLock<Vec<String>>>,
}

impl ServedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: Vec<String>) -> Self {
        Self {
            files: Arc::new(RwLock::new(files)),
        }
    }

    /// Copy of the current list
    pub async fn snapshot(&self) -> Vec<String> {
        self.files.read().await.clone()
    }

    pub async fn replace(&self, files: Vec<String>) {
        *self.files.write().await = files;
    }

    /// Re-enumerate `store` and swap in the result
    pub async fn refresh<S: FileStore>(&self, store: &S) -> Result<usize> {
        let files = store.list_files().await?;
        let count = files.len();
        debug!("Served file list refreshed: {:?}", files);
        self.replace(files).await;
        Ok(count)
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DirectoryStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_refresh_picks_up_new_files() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        let served = ServedFiles::new();

        assert_eq!(served.refresh(&store).await.unwrap(), 0);
        assert!(served.is_empty().await);

        std::fs::write(dir.path().join("fresh.txt"), b"new").unwrap();
        assert_eq!(served.refresh(&store).await.unwrap(), 1);
        assert_eq!(served.snapshot().await, vec!["fresh.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let served = ServedFiles::with_files(vec!["a".to_string()]);
        let other = served.clone();
        other.replace(vec!["b".to_string(), "c".to_string()]).await;
        assert_eq!(served.len().await, 2);
    }
}
