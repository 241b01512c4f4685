pub(crate) mod adapter;
pub(crate) mod api;
pub(crate) mod custom;
pub(crate) mod embedding_model;
pub(crate) mod language_model;
pub(crate) mod local;

pub use adapter::{AdapterHandle, AdapterTrainer, CustomFitFunc};
pub use api::{ApiEmbeddingModel, ApiLangModel, ApiModelConfig};
pub use custom::{CustomEmbeddingFunc, CustomLangModelGenerateFunc};
pub use embedding_model::{EmbeddingModel, EmbeddingModelInference};
pub use language_model::{GenerationRequest, LangModel, LangModelInference};
pub use local::HashingEmbeddingModel;
