use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::{Stream, StreamExt as _};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::{sync::watch, task::JoinHandle};

use super::TextChunker;
use crate::{
    config::KnowledgeBaseConfig,
    error::{Error, Result},
    model::{EmbeddingModel, EmbeddingModelInference as _},
    storage::BlobStore,
    utils::{Backoff, BoxStream, sleep},
    value::{ChunkId, Embedding, KnowledgeChunk, RetrievalResult, SourceDocument},
    vector_store::VectorStore,
};

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceEntry {
    latest_version: u32,
    /// Hash of the latest version's text and tags; empty after removal.
    content_hash: String,
    /// Chunk ids still held by the index, per version.
    versions: BTreeMap<u32, Vec<ChunkId>>,
}

#[derive(Clone, Debug, Default)]
struct Catalog {
    sources: BTreeMap<String, SourceEntry>,
    tombstones: HashSet<ChunkId>,
}

impl Catalog {
    fn live_chunks(&self) -> usize {
        self.sources
            .values()
            .flat_map(|e| e.versions.values().flatten())
            .filter(|id| !self.tombstones.contains(*id))
            .count()
    }

    fn live_sources(&self) -> usize {
        self.sources
            .values()
            .filter(|e| {
                e.versions
                    .values()
                    .flatten()
                    .any(|id| !self.tombstones.contains(id))
            })
            .count()
    }

    /// Marks chunk ids as superseded and returns how many were newly marked.
    fn tombstone<'a>(&mut self, ids: impl IntoIterator<Item = &'a ChunkId>) -> usize {
        ids.into_iter()
            .filter(|id| self.tombstones.insert((*id).clone()))
            .count()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    format_version: u32,
    dimension: usize,
    sources: BTreeMap<String, SourceEntry>,
    tombstones: BTreeSet<ChunkId>,
    chunks: Vec<KnowledgeChunk>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeStats {
    pub live_chunks: usize,
    pub tombstoned_chunks: usize,
    pub sources: usize,
}

/// Outcome of one document of an ingestion stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub source_id: String,
    /// Version assigned to the document; `None` if its content was unchanged.
    pub version: Option<u32>,
    pub chunks: usize,
}

/// Versioned store of embedded document chunks.
///
/// Chunks are immutable. Re-ingesting a source adds a new version and
/// superseded chunks are tombstoned, so they stop being retrieved but stay in
/// the index until [`KnowledgeBase::compact`] removes them.
pub struct KnowledgeBase {
    config: KnowledgeBaseConfig,
    embedding_model: EmbeddingModel,
    store: VectorStore,
    chunker: TextChunker,
    backoff: Backoff,
    catalog: RwLock<Catalog>,
    source_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Bumped on every mutation; lets the checkpointer skip idle intervals.
    revision: AtomicU64,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("dimension", &self.dimension())
            .field("stats", &self.stats())
            .finish()
    }
}

impl KnowledgeBase {
    pub fn new(config: KnowledgeBaseConfig, embedding_model: EmbeddingModel) -> Self {
        let store = VectorStore::new_flat(embedding_model.dimension());
        Self::with_store(config, embedding_model, store)
    }

    pub fn with_store(
        config: KnowledgeBaseConfig,
        embedding_model: EmbeddingModel,
        store: VectorStore,
    ) -> Self {
        Self {
            chunker: TextChunker::new(config.chunk_size, config.chunk_overlap),
            backoff: Backoff::new(config.backoff_base_ms, config.backoff_max_ms),
            config,
            embedding_model,
            store,
            catalog: RwLock::new(Catalog::default()),
            source_locks: Mutex::new(HashMap::new()),
            revision: AtomicU64::new(0),
        }
    }

    /// Restores a knowledge base from the checkpoint under `key`, or returns an
    /// empty one when there is none.
    pub async fn load(
        config: KnowledgeBaseConfig,
        embedding_model: EmbeddingModel,
        blob_store: &dyn BlobStore,
        key: &str,
    ) -> Result<Self> {
        let kb = Self::new(config, embedding_model);
        let Some(data) = blob_store.get(key).await.map_err(Error::Storage)? else {
            log::info!("no knowledge checkpoint under {:?}, starting empty", key);
            return Ok(kb);
        };
        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        kb.restore(snapshot).await?;
        let stats = kb.stats();
        log::info!(
            "knowledge base restored from {:?}: {} live chunks, {} tombstoned, {} sources",
            key,
            stats.live_chunks,
            stats.tombstoned_chunks,
            stats.sources
        );
        Ok(kb)
    }

    async fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let expected = self.dimension();
        if snapshot.dimension != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: snapshot.dimension,
            });
        }
        if let Some(chunk) = snapshot.chunks.iter().find(|c| c.embedding.dim() != expected) {
            return Err(Error::DimensionMismatch {
                expected,
                actual: chunk.embedding.dim(),
            });
        }
        let present = snapshot
            .chunks
            .iter()
            .map(|c| c.id.clone())
            .collect::<HashSet<_>>();
        let chunks = snapshot.chunks;
        self.with_index("restore", || self.store.add_chunks(chunks.clone()))
            .await?;

        let mut catalog = self.catalog.write();
        catalog.sources = snapshot.sources;
        for entry in catalog.sources.values_mut() {
            for ids in entry.versions.values_mut() {
                ids.retain(|id| present.contains(id));
            }
            entry.versions.retain(|_, ids| !ids.is_empty());
        }
        catalog.tombstones = snapshot
            .tombstones
            .into_iter()
            .filter(|id| present.contains(id))
            .collect();
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.embedding_model.dimension()
    }

    pub fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }

    /// Serializes every versioning operation on one source.
    async fn lock_source(&self, source_id: &str) -> SourceGuard<'_> {
        let lock = self
            .source_locks
            .lock()
            .entry(source_id.to_owned())
            .or_default()
            .clone();
        SourceGuard {
            locks: &self.source_locks,
            source_id: source_id.to_owned(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn touch(&self) {
        self.revision.fetch_add(1, Ordering::Relaxed);
    }

    /// Runs an index operation with a timeout, retrying with backoff.
    async fn with_index<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = self.config.index_retries + 1;
        let timeout = self.config.index_timeout();
        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(self.backoff.delay(attempt - 1)).await;
            }
            match tokio::time::timeout(timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => last_error = format!("{:#}", e),
                Err(_) => last_error = format!("timed out after {:?}", timeout),
            }
            log::warn!(
                "index {} attempt {}/{} failed: {}",
                op,
                attempt + 1,
                attempts,
                last_error
            );
        }
        Err(Error::IndexUnavailable(format!(
            "{} failed after {} attempts: {}",
            op, attempts, last_error
        )))
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let embedding = self
            .with_index("embed", || self.embedding_model.infer(text.to_owned()))
            .await?;
        let expected = self.dimension();
        if embedding.dim() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: embedding.dim(),
            });
        }
        Ok(embedding)
    }

    /// Adds a new version of a document, unless its content is unchanged.
    ///
    /// Returns the chunks of the new version; empty when nothing changed.
    /// Older versions stay live; see [`KnowledgeBase::update`].
    pub async fn ingest(&self, document: SourceDocument) -> Result<Vec<KnowledgeChunk>> {
        let _guard = self.lock_source(&document.source_id).await;
        Ok(self.ingest_locked(&document, false).await?.chunks)
    }

    /// Ingests a document and tombstones every chunk of its older versions.
    ///
    /// A changed document that yields no chunks, e.g. blank text, still
    /// supersedes the older versions.
    pub async fn update(&self, document: SourceDocument) -> Result<Vec<KnowledgeChunk>> {
        Ok(self.update_versioned(document).await?.chunks)
    }

    async fn update_versioned(&self, document: SourceDocument) -> Result<Ingested> {
        let _guard = self.lock_source(&document.source_id).await;
        self.ingest_locked(&document, true).await
    }

    async fn ingest_locked(&self, document: &SourceDocument, supersede: bool) -> Result<Ingested> {
        let hash = content_hash(document);
        let latest_version = {
            let catalog = self.catalog.read();
            match catalog.sources.get(&document.source_id) {
                Some(entry) if entry.content_hash == hash => {
                    log::debug!(
                        "source {} unchanged at version {}",
                        document.source_id,
                        entry.latest_version
                    );
                    return Ok(Ingested::default());
                }
                Some(entry) => entry.latest_version,
                None => 0,
            }
        };
        let version = latest_version + 1;

        let mut chunks = Vec::new();
        for (ordinal, text) in self.chunker.split(&document.text).into_iter().enumerate() {
            let embedding = self.embed(&text).await?;
            chunks.push(KnowledgeChunk {
                id: KnowledgeChunk::make_id(&document.source_id, version, ordinal),
                source_id: document.source_id.clone(),
                ordinal,
                text,
                embedding,
                tags: document.tags.clone(),
                version,
            });
        }
        if !chunks.is_empty() {
            self.with_index("add", || self.store.add_chunks(chunks.clone()))
                .await?;
        }

        // New chunks and their tombstones change under one write lock.
        let tombstoned = {
            let mut catalog = self.catalog.write();
            let entry = catalog
                .sources
                .entry(document.source_id.clone())
                .or_default();
            entry.latest_version = version;
            entry.content_hash = hash;
            if !chunks.is_empty() {
                entry
                    .versions
                    .insert(version, chunks.iter().map(|c| c.id.clone()).collect());
            }
            let superseded = if supersede {
                entry
                    .versions
                    .range(..version)
                    .flat_map(|(_, ids)| ids.iter().cloned())
                    .collect::<Vec<_>>()
            } else {
                Vec::new()
            };
            catalog.tombstone(superseded.iter())
        };
        self.touch();
        log::info!(
            "ingested {} as version {} ({} chunks, {} tombstoned)",
            document.source_id,
            version,
            chunks.len(),
            tombstoned
        );
        Ok(Ingested {
            version: Some(version),
            chunks,
        })
    }

    /// Tombstones every live chunk of a source and returns how many there were.
    pub async fn remove_source(&self, source_id: &str) -> Result<usize> {
        let _guard = self.lock_source(source_id).await;
        let mut catalog = self.catalog.write();
        let Some(entry) = catalog.sources.get_mut(source_id) else {
            return Ok(0);
        };
        entry.content_hash.clear();
        let ids = entry
            .versions
            .values()
            .flatten()
            .cloned()
            .collect::<Vec<_>>();
        let n = catalog.tombstone(ids.iter());
        drop(catalog);
        self.touch();
        log::info!("removed source {} ({} chunks tombstoned)", source_id, n);
        Ok(n)
    }

    /// Top-`k` live chunks for `text` whose tags intersect `tags_filter`.
    ///
    /// An empty filter does not restrict by tag.
    pub async fn query(
        &self,
        text: &str,
        tags_filter: &BTreeSet<String>,
        k: usize,
    ) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::empty());
        }
        let embedding = self.embed(text).await?;
        let tombstones = self.catalog.read().tombstones.clone();
        let tags_filter = tags_filter.clone();
        let filter = move |chunk: &KnowledgeChunk| {
            !tombstones.contains(&chunk.id) && chunk.matches_tags(&tags_filter)
        };
        let items = self
            .with_index("query", || self.store.retrieve(&embedding, k, &filter))
            .await?;
        Ok(RetrievalResult::new(items, k))
    }

    /// Physically removes tombstoned chunks and returns how many were removed.
    pub async fn compact(&self) -> Result<usize> {
        let ids = self
            .catalog
            .read()
            .tombstones
            .iter()
            .cloned()
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Ok(0);
        }
        self.with_index("compact", || self.store.remove_chunks(&ids))
            .await?;

        let mut catalog = self.catalog.write();
        for id in ids.iter() {
            catalog.tombstones.remove(id);
        }
        let removed = ids.iter().collect::<HashSet<_>>();
        for entry in catalog.sources.values_mut() {
            for chunk_ids in entry.versions.values_mut() {
                chunk_ids.retain(|id| !removed.contains(id));
            }
            entry.versions.retain(|_, chunk_ids| !chunk_ids.is_empty());
        }
        drop(catalog);
        self.touch();
        log::info!("compacted {} tombstoned chunks", ids.len());
        Ok(ids.len())
    }

    /// Writes the full state as JSON under `key`.
    pub async fn checkpoint(&self, blob_store: &dyn BlobStore, key: &str) -> Result<()> {
        let revision = self.revision.load(Ordering::Relaxed);
        // Catalog first: anything it references is already in the index.
        let catalog = self.catalog.read().clone();
        let referenced = catalog
            .sources
            .values()
            .flat_map(|e| e.versions.values().flatten())
            .collect::<HashSet<_>>();
        let chunks = self
            .with_index("snapshot", || self.store.all_chunks())
            .await?
            .into_iter()
            .filter(|c| referenced.contains(&c.id))
            .collect::<Vec<_>>();
        let snapshot = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            dimension: self.dimension(),
            sources: catalog.sources.clone(),
            tombstones: catalog.tombstones.iter().cloned().collect(),
            chunks,
        };
        let data = serde_json::to_vec(&snapshot)?;
        blob_store
            .put(key, data)
            .await
            .map_err(Error::Storage)?;
        log::debug!(
            "checkpointed {} chunks under {:?} at revision {}",
            snapshot.chunks.len(),
            key,
            revision
        );
        Ok(())
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Relaxed)
    }

    /// Checkpoints every `interval` while the knowledge base changed since the
    /// last checkpoint.
    pub fn spawn_checkpointer(
        self: &Arc<Self>,
        blob_store: Arc<dyn BlobStore>,
        key: impl Into<String>,
        interval: Duration,
    ) -> Checkpointer {
        let kb = self.clone();
        let key = key.into();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut saved = kb.revision();
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                }
                let revision = kb.revision();
                if revision == saved {
                    continue;
                }
                match kb.checkpoint(blob_store.as_ref(), &key).await {
                    Ok(()) => saved = revision,
                    Err(e) => log::error!("periodic checkpoint failed: {}", e),
                }
            }
        });
        Checkpointer { stop_tx, handle }
    }

    pub fn stats(&self) -> KnowledgeStats {
        let catalog = self.catalog.read();
        KnowledgeStats {
            live_chunks: catalog.live_chunks(),
            tombstoned_chunks: catalog.tombstones.len(),
            sources: catalog.live_sources(),
        }
    }

    /// Applies [`KnowledgeBase::update`] to every document of a stream.
    pub fn ingest_stream<'a, S>(&'a self, documents: S) -> BoxStream<'a, Result<IngestReport>>
    where
        S: Stream<Item = SourceDocument> + Send + 'a,
    {
        Box::pin(async_stream::stream! {
            let mut documents = std::pin::pin!(documents);
            while let Some(document) = documents.next().await {
                let source_id = document.source_id.clone();
                yield self.update_versioned(document).await.map(|ingested| IngestReport {
                    source_id,
                    version: ingested.version,
                    chunks: ingested.chunks.len(),
                });
            }
        })
    }
}

#[derive(Default)]
struct Ingested {
    /// Version assigned to the document; `None` if its content was unchanged.
    version: Option<u32>,
    chunks: Vec<KnowledgeChunk>,
}

/// Exclusive hold on one source; drops the source's lock entry once no other
/// task is waiting on it.
struct SourceGuard<'a> {
    locks: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    source_id: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(&self.source_id)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(&self.source_id);
        }
    }
}

/// Handle to the periodic checkpoint task.
pub struct Checkpointer {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Checkpointer {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            log::error!("checkpoint task panicked: {}", e);
        }
    }
}

fn content_hash(document: &SourceDocument) -> String {
    let mut hasher = Sha1::new();
    hasher.update(document.text.as_bytes());
    for tag in document.tags.iter() {
        hasher.update([0u8]);
        hasher.update(tag.as_bytes());
    }
    hex::encode(hasher.finalize())
}
