mod base;
mod chunker;
mod loader;
pub mod rules;
mod retriever;

pub use base::*;
pub use chunker::TextChunker;
pub use loader::{parse_jsonl, read_jsonl};
pub use retriever::Retriever;
