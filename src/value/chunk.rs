use std::{cmp::Ordering, collections::BTreeSet};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::Embedding;

pub type ChunkId = String;

/// A raw document produced by an ingestion source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(alias = "id")]
    pub source_id: String,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl SourceDocument {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// A bounded span of document text plus its embedding; the unit of retrieval.
///
/// Chunks are never mutated. A newer version of the same source supersedes
/// older chunks through a tombstone kept by the knowledge base.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: ChunkId,
    pub source_id: String,
    /// Position of the chunk within its document version.
    pub ordinal: usize,
    pub text: String,
    pub embedding: Embedding,
    pub tags: BTreeSet<String>,
    pub version: u32,
}

impl KnowledgeChunk {
    pub fn make_id(source_id: &str, version: u32, ordinal: usize) -> ChunkId {
        format!("{}@v{}#{}", source_id, version, ordinal)
    }

    /// Empty filter matches every chunk.
    pub fn matches_tags(&self, filter: &BTreeSet<String>) -> bool {
        filter.is_empty() || !self.tags.is_disjoint(filter)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

impl ScoredChunk {
    /// Descending score, then higher version, then chunk id for a total order.
    fn rank(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
        OrderedFloat(b.score)
            .cmp(&OrderedFloat(a.score))
            .then_with(|| b.chunk.version.cmp(&a.chunk.version))
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    }
}

/// Chunks relevant to a query, best first.
///
/// Scores never increase along the sequence; equal scores are ordered by
/// higher chunk version first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    items: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(mut items: Vec<ScoredChunk>, k: usize) -> Self {
        items.sort_by(ScoredChunk::rank);
        items.truncate(k);
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredChunk> {
        self.items.iter()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &KnowledgeChunk> {
        self.items.iter().map(|s| &s.chunk)
    }

    /// Keeps only entries scoring at least `min_score`; order is unchanged.
    pub fn above(mut self, min_score: f32) -> Self {
        self.items.retain(|s| s.score >= min_score);
        self
    }
}

impl IntoIterator for RetrievalResult {
    type Item = ScoredChunk;
    type IntoIter = std::vec::IntoIter<ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
