use std::time::Duration;

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    model::{EmbeddingModelInference, GenerationRequest, LangModelInference},
    value::Embedding,
};

/// Connection settings of an OpenAI-compatible inference server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiModelConfig {
    /// Base URL, e.g. `http://localhost:8000/v1/`.
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl ApiModelConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            request_timeout_ms: None,
        }
    }

    pub fn with_api_key(self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).with_context(|| format!("invalid base url {}", base))?;
        Ok(base.join(path)?)
    }

    fn client(&self) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = self.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        Ok(builder.build()?)
    }

    fn request(&self, client: &reqwest::Client, url: Url) -> reqwest::RequestBuilder {
        let builder = client
            .request(reqwest::Method::POST, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

/// Generation through the `chat/completions` endpoint, without streaming.
#[derive(Clone, Debug)]
pub struct ApiLangModel {
    config: ApiModelConfig,
    url: Url,
    client: reqwest::Client,
}

impl ApiLangModel {
    pub fn try_new(config: ApiModelConfig) -> anyhow::Result<Self> {
        Ok(Self {
            url: config.endpoint("chat/completions")?,
            client: config.client()?,
            config,
        })
    }

    fn make_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "max_tokens": request.max_tokens,
            "stream": false,
        });
        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }
}

fn parse_completion(body: &serde_json::Value) -> anyhow::Result<String> {
    match body
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
    {
        Some(text) => Ok(text.to_owned()),
        None => bail!("completion response has no message content"),
    }
}

#[async_trait]
impl LangModelInference for ApiLangModel {
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<String> {
        let resp = self
            .config
            .request(&self.client, self.url.clone())
            .json(&self.make_body(&request))
            .send()
            .await
            .context("generation request failed")?
            .error_for_status()
            .context("generation service returned an error status")?;
        let body: serde_json::Value = resp.json().await.context("invalid completion body")?;
        parse_completion(&body)
    }
}

/// Embeddings through the `embeddings` endpoint.
#[derive(Clone, Debug)]
pub struct ApiEmbeddingModel {
    config: ApiModelConfig,
    url: Url,
    client: reqwest::Client,
    dim: usize,
}

impl ApiEmbeddingModel {
    pub fn try_new(config: ApiModelConfig, dim: usize) -> anyhow::Result<Self> {
        Ok(Self {
            url: config.endpoint("embeddings")?,
            client: config.client()?,
            config,
            dim,
        })
    }
}

fn parse_embedding(body: &serde_json::Value) -> anyhow::Result<Vec<f32>> {
    let Some(values) = body.pointer("/data/0/embedding").and_then(|v| v.as_array()) else {
        bail!("embedding response has no data");
    };
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .context("embedding contains a non-numeric value")
        })
        .collect()
}

#[async_trait]
impl EmbeddingModelInference for ApiEmbeddingModel {
    async fn infer(&self, text: String) -> anyhow::Result<Embedding> {
        let body = serde_json::json!({"model": self.config.model, "input": text});
        let resp = self
            .config
            .request(&self.client, self.url.clone())
            .json(&body)
            .send()
            .await
            .context("embedding request failed")?
            .error_for_status()
            .context("embedding service returned an error status")?;
        let body: serde_json::Value = resp.json().await.context("invalid embedding body")?;
        Ok(parse_embedding(&body)?.into())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
