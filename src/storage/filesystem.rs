use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use tokio::fs::{
    create_dir_all as tokio_create_dir_all, read as tokio_read, remove_file as tokio_remove_file,
    rename as tokio_rename, write as tokio_write,
};

use super::BlobStore;

/// Stores every blob as one file under a root directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written checkpoint.
#[derive(Clone, Debug)]
pub struct FileSystemBlobStore {
    root: PathBuf,
}

impl FileSystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty()
            || key.contains(['/', '\\'])
            || key.starts_with('.')
        {
            bail!("invalid blob key {:?}", key);
        }
        Ok(self.root.join(format!("{}.blob", key)))
    }
}

#[async_trait]
impl BlobStore for FileSystemBlobStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path_of(key)?;
        match tokio_read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("tokio::fs::read {} failed", path.display())),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let path = self.path_of(key)?;
        if !self.root.exists() {
            tokio_create_dir_all(&self.root)
                .await
                .context("tokio::fs::create_dir_all failed")?;
        }
        let tmp = path.with_extension("blob.tmp");
        tokio_write(&tmp, data)
            .await
            .context("tokio::fs::write failed")?;
        tokio_rename(&tmp, &path)
            .await
            .context("tokio::fs::rename failed")
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_of(key)?;
        match tokio_remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("tokio::fs::remove_file failed"),
        }
    }
}
