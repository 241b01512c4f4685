use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{training::TrainingExample, utils::BoxFuture};

/// Identifies a fine-tuned adapter produced by the training service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterHandle {
    pub id: String,
    pub base_model: String,
    pub num_examples: usize,
}

/// Seam to the external fine-tuning service.
#[async_trait]
pub trait AdapterTrainer: Send + Sync {
    async fn fit(&self, examples: Vec<TrainingExample>) -> anyhow::Result<AdapterHandle>;
}

pub type CustomFitFunc =
    dyn Fn(Vec<TrainingExample>) -> BoxFuture<'static, anyhow::Result<AdapterHandle>> + Send + Sync;

#[async_trait]
impl AdapterTrainer for Arc<CustomFitFunc> {
    async fn fit(&self, examples: Vec<TrainingExample>) -> anyhow::Result<AdapterHandle> {
        if examples.is_empty() {
            anyhow::bail!("refusing to fit an adapter on zero examples");
        }
        (self)(examples).await
    }
}
