use std::{path::Path, time::Duration};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::{
    constants::*,
    error::{Error, Result},
};

/// Chunking, index access and checkpointing of the knowledge base.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeBaseConfig {
    /// Maximum chunk length in extended grapheme clusters.
    pub chunk_size: usize,
    /// Graphemes shared by two consecutive chunks.
    pub chunk_overlap: usize,
    pub index_timeout_ms: u64,
    pub index_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub checkpoint_key: String,
    pub checkpoint_interval_secs: u64,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            index_timeout_ms: DEFAULT_INDEX_TIMEOUT_MS,
            index_retries: DEFAULT_INDEX_RETRIES,
            backoff_base_ms: DEFAULT_INDEX_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_INDEX_BACKOFF_MAX_MS,
            checkpoint_key: DEFAULT_CHECKPOINT_KEY.to_owned(),
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL_SECS,
        }
    }
}

impl KnowledgeBaseConfig {
    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Chunks scoring below this cosine similarity are not used as context.
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    pub confidence_threshold: f32,
    pub max_generation_retries: u32,
    pub max_low_confidence_retries: u32,
    pub generation_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_concurrent_runs: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_generation_retries: DEFAULT_MAX_GENERATION_RETRIES,
            max_low_confidence_retries: DEFAULT_MAX_LOW_CONFIDENCE_RETRIES,
            generation_timeout_ms: DEFAULT_GENERATION_TIMEOUT_MS,
            backoff_base_ms: DEFAULT_GENERATION_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_GENERATION_BACKOFF_MAX_MS,
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
        }
    }
}

impl OrchestratorConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

/// Constraints forwarded with every generation request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            stop: Vec::new(),
            temperature: None,
        }
    }
}

/// Top-level configuration of the report pipeline.
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub knowledge: KnowledgeBaseConfig,
    pub retrieval: RetrievalConfig,
    pub orchestrator: OrchestratorConfig,
    pub generation: GenerationConfig,
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Ok(Self::from_json_str(&content)?)
    }

    pub fn validate(&self) -> Result<()> {
        let k = &self.knowledge;
        if k.chunk_size == 0 {
            return Err(Error::Config("chunkSize must be positive".into()));
        }
        if k.chunk_overlap >= k.chunk_size {
            return Err(Error::Config(format!(
                "chunkOverlap ({}) must be smaller than chunkSize ({})",
                k.chunk_overlap, k.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("topK must be positive".into()));
        }
        let threshold = self.orchestrator.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "confidenceThreshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.orchestrator.max_concurrent_runs == 0 {
            return Err(Error::Config("maxConcurrentRuns must be positive".into()));
        }
        Ok(())
    }
}
