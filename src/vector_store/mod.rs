pub(crate) mod base;
pub(crate) mod local;

pub use base::{ChunkFilter, VectorStore, VectorStoreBehavior};
pub use local::FlatStore;
