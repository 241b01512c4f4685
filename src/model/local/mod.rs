mod hashing_embedding_model;

pub use hashing_embedding_model::*;
