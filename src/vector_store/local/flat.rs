use std::collections::HashMap;

use anyhow::bail;
use async_trait::async_trait;

use super::super::base::{ChunkFilter, VectorStoreBehavior};
use crate::{
    utils::cosine_similarity,
    value::{ChunkId, Embedding, KnowledgeChunk, RetrievalResult, ScoredChunk},
};

/// Exact nearest-neighbour search over an in-memory chunk table.
#[derive(Debug, Default)]
pub struct FlatStore {
    dim: usize,
    docs: HashMap<ChunkId, KnowledgeChunk>,
}

impl FlatStore {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            docs: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    fn check_dim(&self, embedding: &Embedding) -> anyhow::Result<()> {
        if embedding.dim() != self.dim {
            bail!(
                "embedding dimension {} does not match index dimension {}",
                embedding.dim(),
                self.dim
            );
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStoreBehavior for FlatStore {
    async fn add_chunks(&mut self, chunks: Vec<KnowledgeChunk>) -> anyhow::Result<Vec<ChunkId>> {
        for chunk in chunks.iter() {
            self.check_dim(&chunk.embedding)?;
        }
        let ids = chunks.iter().map(|c| c.id.clone()).collect();
        self.docs
            .extend(chunks.into_iter().map(|c| (c.id.clone(), c)));
        Ok(ids)
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<KnowledgeChunk>> {
        Ok(self.docs.get(id).cloned())
    }

    async fn retrieve(
        &self,
        query_embedding: &Embedding,
        top_k: usize,
        filter: &ChunkFilter,
    ) -> anyhow::Result<Vec<ScoredChunk>> {
        self.check_dim(query_embedding)?;
        let scored = self
            .docs
            .values()
            .filter(|chunk| filter(chunk))
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(query_embedding.as_slice(), chunk.embedding.as_slice()),
                chunk: chunk.clone(),
            })
            .collect::<Vec<_>>();
        Ok(RetrievalResult::new(scored, top_k).into_iter().collect())
    }

    async fn remove_chunks(&mut self, ids: &[ChunkId]) -> anyhow::Result<usize> {
        Ok(ids
            .iter()
            .filter(|id| self.docs.remove(id.as_str()).is_some())
            .count())
    }

    async fn all_chunks(&self) -> anyhow::Result<Vec<KnowledgeChunk>> {
        let mut chunks = self.docs.values().cloned().collect::<Vec<_>>();
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(chunks)
    }

    async fn clear(&mut self) -> anyhow::Result<()> {
        self.docs.clear();
        Ok(())
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.docs.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn chunk(id: &str, version: u32, embedding: Vec<f32>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.into(),
            source_id: "src".into(),
            ordinal: 0,
            text: id.into(),
            embedding: embedding.into(),
            tags: BTreeSet::new(),
            version,
        }
    }

    #[tokio::test]
    async fn retrieves_nearest_first() {
        let mut store = FlatStore::new(2);
        store
            .add_chunks(vec![
                chunk("x", 1, vec![1.0, 0.0]),
                chunk("y", 1, vec![0.0, 1.0]),
                chunk("xy", 1, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();
        let result = store
            .retrieve(&vec![1.0, 0.1].into(), 2, &|_| true)
            .await
            .unwrap();
        let ids = result.iter().map(|s| s.chunk.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["x", "xy"]);
        assert!(result[0].score >= result[1].score);
    }

    #[tokio::test]
    async fn equal_scores_prefer_newer_version() {
        let mut store = FlatStore::new(2);
        store
            .add_chunks(vec![
                chunk("a@v1#0", 1, vec![1.0, 0.0]),
                chunk("a@v2#0", 2, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let result = store
            .retrieve(&vec![1.0, 0.0].into(), 1, &|_| true)
            .await
            .unwrap();
        assert_eq!(result[0].chunk.version, 2);
    }

    #[tokio::test]
    async fn filter_and_removal() {
        let mut store = FlatStore::new(2);
        store
            .add_chunks(vec![chunk("a", 1, vec![1.0, 0.0]), chunk("b", 1, vec![1.0, 0.0])])
            .await
            .unwrap();
        let result = store
            .retrieve(&vec![1.0, 0.0].into(), 5, &|c| c.id != "a")
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(store.remove_chunks(&["a".into(), "zz".into()]).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_wrong_dimension() {
        let mut store = FlatStore::new(3);
        assert!(store.add_chunks(vec![chunk("a", 1, vec![1.0])]).await.is_err());
        assert!(
            store
                .retrieve(&vec![1.0].into(), 1, &|_| true)
                .await
                .is_err()
        );
    }
}
