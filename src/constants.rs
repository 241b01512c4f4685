pub const DEFAULT_CHUNK_SIZE: usize = 256;
pub const DEFAULT_CHUNK_OVERLAP: usize = 32;

pub const DEFAULT_INDEX_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_INDEX_RETRIES: u32 = 2;
pub const DEFAULT_INDEX_BACKOFF_BASE_MS: u64 = 100;
pub const DEFAULT_INDEX_BACKOFF_MAX_MS: u64 = 2_000;

pub const DEFAULT_CHECKPOINT_KEY: &str = "knowledge-index";
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 300;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.1;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_GENERATION_RETRIES: u32 = 2;
pub const DEFAULT_MAX_LOW_CONFIDENCE_RETRIES: u32 = 1;
pub const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_GENERATION_BACKOFF_BASE_MS: u64 = 500;
pub const DEFAULT_GENERATION_BACKOFF_MAX_MS: u64 = 8_000;
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

pub const DEFAULT_MAX_TOKENS: u32 = 512;

pub const DEFAULT_HASHING_DIMENSION: usize = 256;

/// Placeholder rendered for template slots without a value.
pub const NOT_DOCUMENTED: &str = "Not documented";

/// Retrieved chunk text is cut to this many graphemes inside prompts.
pub const PROMPT_DOCUMENT_MAX_GRAPHEMES: usize = 600;
