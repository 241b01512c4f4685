use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::local::FlatStore;
use crate::value::{ChunkId, Embedding, KnowledgeChunk, ScoredChunk};

/// Predicate a chunk must satisfy to be a retrieval candidate.
pub type ChunkFilter = dyn Fn(&KnowledgeChunk) -> bool + Send + Sync;

#[async_trait]
pub trait VectorStoreBehavior: Send + Sync {
    async fn add_chunks(&mut self, chunks: Vec<KnowledgeChunk>) -> anyhow::Result<Vec<ChunkId>>;
    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<KnowledgeChunk>>;
    /// Up to `top_k` chunks passing `filter`, scored by cosine similarity.
    async fn retrieve(
        &self,
        query_embedding: &Embedding,
        top_k: usize,
        filter: &ChunkFilter,
    ) -> anyhow::Result<Vec<ScoredChunk>>;
    async fn remove_chunks(&mut self, ids: &[ChunkId]) -> anyhow::Result<usize>;
    async fn all_chunks(&self) -> anyhow::Result<Vec<KnowledgeChunk>>;
    async fn clear(&mut self) -> anyhow::Result<()>;
    async fn count(&self) -> anyhow::Result<usize>;
}

#[derive(Clone)]
enum VectorStoreInner {
    Flat(Arc<RwLock<FlatStore>>),
    Custom(Arc<RwLock<Box<dyn VectorStoreBehavior>>>),
}

/// Shared handle to the similarity index behind a knowledge base.
#[derive(Clone)]
pub struct VectorStore {
    inner: VectorStoreInner,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            VectorStoreInner::Flat(_) => f.write_str("VectorStore::Flat"),
            VectorStoreInner::Custom(_) => f.write_str("VectorStore::Custom"),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $lock:ident, |$store:ident| $body:expr) => {
        match &$self.inner {
            VectorStoreInner::Flat(inner) => {
                let $store = inner.$lock().await;
                $body
            }
            VectorStoreInner::Custom(inner) => {
                let $store = inner.$lock().await;
                $body
            }
        }
    };
}

impl VectorStore {
    pub fn new_flat(dim: usize) -> Self {
        Self {
            inner: VectorStoreInner::Flat(Arc::new(RwLock::new(FlatStore::new(dim)))),
        }
    }

    pub fn new_custom(store: impl VectorStoreBehavior + 'static) -> Self {
        Self {
            inner: VectorStoreInner::Custom(Arc::new(RwLock::new(Box::new(store)))),
        }
    }

    pub async fn add_chunks(&self, chunks: Vec<KnowledgeChunk>) -> anyhow::Result<Vec<ChunkId>> {
        dispatch!(self, write, |store| {
            let mut store = store;
            store.add_chunks(chunks).await
        })
    }

    pub async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<KnowledgeChunk>> {
        dispatch!(self, read, |store| store.get_by_id(id).await)
    }

    pub async fn retrieve(
        &self,
        query_embedding: &Embedding,
        top_k: usize,
        filter: &ChunkFilter,
    ) -> anyhow::Result<Vec<ScoredChunk>> {
        dispatch!(self, read, |store| store
            .retrieve(query_embedding, top_k, filter)
            .await)
    }

    pub async fn remove_chunks(&self, ids: &[ChunkId]) -> anyhow::Result<usize> {
        dispatch!(self, write, |store| {
            let mut store = store;
            store.remove_chunks(ids).await
        })
    }

    pub async fn all_chunks(&self) -> anyhow::Result<Vec<KnowledgeChunk>> {
        dispatch!(self, read, |store| store.all_chunks().await)
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        dispatch!(self, write, |store| {
            let mut store = store;
            store.clear().await
        })
    }

    pub async fn count(&self) -> anyhow::Result<usize> {
        dispatch!(self, read, |store| store.count().await)
    }
}
