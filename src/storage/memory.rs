use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::BlobStore;

#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = self.blobs.read().keys().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.blobs.write().insert(key.to_owned(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.blobs.write().remove(key);
        Ok(())
    }
}
