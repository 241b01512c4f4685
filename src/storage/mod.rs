mod filesystem;
mod memory;

use async_trait::async_trait;
pub use filesystem::FileSystemBlobStore;
pub use memory::MemoryBlobStore;

/// Key/value blob persistence used for knowledge base checkpoints.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, data: Vec<u8>) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}
