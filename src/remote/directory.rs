//! 目录推送：复制到 `<root>/<bucket>/<key>`

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::RemoteTransfer;
use crate::core::TransportError;

pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl RemoteTransfer for DirectoryRemote {
    async fn push(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), TransportError> {
        let dest = self.object_path(bucket, key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransportError::new(key, format!("mkdir {}: {e}", parent.display())))?;
        }
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| TransportError::new(key, format!("copy to {}: {e}", dest.display())))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_push_copies_into_bucket_dir() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.zip");
        tokio::fs::write(&src, b"zip").await.unwrap();

        let remote = DirectoryRemote::new(dir.path().join("remote"));
        remote.push(&src, "recordings", "a.zip").await.unwrap();

        let copied = tokio::fs::read(remote.object_path("recordings", "a.zip"))
            .await
            .unwrap();
        assert_eq!(copied, b"zip");
    }

    #[tokio::test]
    async fn test_push_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let remote = DirectoryRemote::new(dir.path());
        let err = remote
            .push(&dir.path().join("gone.zip"), "recordings", "gone.zip")
            .await
            .unwrap_err();
        assert!(err.message.contains("copy"));
    }
}
