use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::GenerationConfig,
    model::{
        ApiLangModel, ApiModelConfig,
        custom::{CustomLangModel, CustomLangModelGenerateFunc},
    },
};

/// A single prompt-to-text request for the generation service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, config: &GenerationConfig) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: config.max_tokens,
            stop: config.stop.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
pub trait LangModelInference: Send + Sync {
    /// Generates text for the prompt. An `Err` means the service itself failed
    /// (unreachable, model unavailable); a structurally odd reply is still `Ok`.
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<String>;
}

#[derive(Clone)]
enum LangModelInner {
    Api(ApiLangModel),
    Custom(CustomLangModel),
}

/// Handle to the external text-generation service.
#[derive(Clone)]
pub struct LangModel {
    inner: LangModelInner,
}

impl std::fmt::Debug for LangModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            LangModelInner::Api(model) => f.debug_tuple("LangModel").field(model).finish(),
            LangModelInner::Custom(_) => f.debug_tuple("LangModel").field(&"custom").finish(),
        }
    }
}

impl LangModel {
    pub fn new_api(config: ApiModelConfig) -> anyhow::Result<Self> {
        Ok(Self {
            inner: LangModelInner::Api(ApiLangModel::try_new(config)?),
        })
    }

    pub fn new_custom(f: Arc<CustomLangModelGenerateFunc>) -> Self {
        Self {
            inner: LangModelInner::Custom(CustomLangModel { generate_func: f }),
        }
    }
}

#[async_trait]
impl LangModelInference for LangModel {
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<String> {
        match &self.inner {
            LangModelInner::Api(model) => model.generate(request).await,
            LangModelInner::Custom(model) => model.generate(request).await,
        }
    }
}
