use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    model::{
        ApiEmbeddingModel, ApiModelConfig, HashingEmbeddingModel,
        custom::{CustomEmbeddingFunc, CustomEmbeddingModel},
    },
    value::Embedding,
};

#[async_trait]
pub trait EmbeddingModelInference: Send + Sync {
    async fn infer(&self, text: String) -> anyhow::Result<Embedding>;

    /// Dimensionality of every embedding this model produces.
    fn dimension(&self) -> usize;
}

#[derive(Debug, Clone)]
enum EmbeddingModelInner {
    Hashing(HashingEmbeddingModel),
    Api(ApiEmbeddingModel),
    Custom(CustomEmbeddingModel),
}

/// The embedding model shared by ingestion and query paths of a knowledge base.
#[derive(Debug, Clone)]
pub struct EmbeddingModel {
    inner: EmbeddingModelInner,
}

impl EmbeddingModel {
    pub fn new_hashing(dim: usize) -> Self {
        Self {
            inner: EmbeddingModelInner::Hashing(HashingEmbeddingModel::new(dim)),
        }
    }

    pub fn new_api(config: ApiModelConfig, dim: usize) -> anyhow::Result<Self> {
        Ok(Self {
            inner: EmbeddingModelInner::Api(ApiEmbeddingModel::try_new(config, dim)?),
        })
    }

    pub fn new_custom(dim: usize, f: Arc<CustomEmbeddingFunc>) -> Self {
        Self {
            inner: EmbeddingModelInner::Custom(CustomEmbeddingModel { dim, f }),
        }
    }
}

#[async_trait]
impl EmbeddingModelInference for EmbeddingModel {
    async fn infer(&self, text: String) -> anyhow::Result<Embedding> {
        match &self.inner {
            EmbeddingModelInner::Hashing(model) => model.infer(text).await,
            EmbeddingModelInner::Api(model) => model.infer(text).await,
            EmbeddingModelInner::Custom(model) => model.infer(text).await,
        }
    }

    fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingModelInner::Hashing(model) => model.dimension(),
            EmbeddingModelInner::Api(model) => model.dimension(),
            EmbeddingModelInner::Custom(model) => model.dimension(),
        }
    }
}
