use std::sync::Arc;

use async_trait::async_trait;

use super::{
    embedding_model::EmbeddingModelInference,
    language_model::{GenerationRequest, LangModelInference},
};
use crate::{utils::BoxFuture, value::Embedding};

pub type CustomLangModelGenerateFunc =
    dyn Fn(GenerationRequest) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync;

pub type CustomEmbeddingFunc =
    dyn Fn(String) -> BoxFuture<'static, anyhow::Result<Embedding>> + Send + Sync;

#[derive(Clone)]
pub(super) struct CustomLangModel {
    pub generate_func: Arc<CustomLangModelGenerateFunc>,
}

#[async_trait]
impl LangModelInference for CustomLangModel {
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<String> {
        (self.generate_func)(request).await
    }
}

#[derive(Clone)]
pub(super) struct CustomEmbeddingModel {
    pub dim: usize,
    pub f: Arc<CustomEmbeddingFunc>,
}

impl std::fmt::Debug for CustomEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomEmbeddingModel")
            .field("dim", &self.dim)
            .field("f", &"function")
            .finish()
    }
}

#[async_trait]
impl EmbeddingModelInference for CustomEmbeddingModel {
    async fn infer(&self, text: String) -> anyhow::Result<Embedding> {
        (self.f)(text).await
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
