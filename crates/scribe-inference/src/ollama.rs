//! Ollama backend for embeddings and text generation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use scribe_core::{
    AdapterError, AdapterResult, Embedder, EmbeddingOutput, Generator, Vector,
};

use crate::InferenceConfig;

/// Ollama-backed [`Embedder`] and [`Generator`].
pub struct OllamaBackend {
    client: reqwest::Client,
    config: InferenceConfig,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaBackend {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Check if Ollama is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.config.ollama_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> AdapterResult<T> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status.as_u16(), body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AdapterError::permanent(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl Embedder for OllamaBackend {
    async fn embed(&self, text: &str) -> AdapterResult<EmbeddingOutput> {
        if text.trim().is_empty() {
            return Err(AdapterError::permanent("cannot embed empty text"));
        }

        let url = format!("{}/api/embed", self.config.ollama_url);
        let parsed: EmbedResponse = self
            .post_json(
                &url,
                json!({ "model": self.config.embed_model, "input": text }),
            )
            .await?;

        let vector = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::permanent("embed response contained no vectors"))?;
        if vector.len() != self.config.embed_dimension {
            return Err(AdapterError::permanent(format!(
                "model returned dimension {}, expected {}",
                vector.len(),
                self.config.embed_dimension
            )));
        }

        debug!(model = %self.config.embed_model, dimension = vector.len(), "Embedded text");
        Ok(EmbeddingOutput {
            vector: Vector::from(vector),
            model_version: self.config.embed_model.clone(),
        })
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_version(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl Generator for OllamaBackend {
    async fn generate(&self, system: &str, prompt: &str) -> AdapterResult<String> {
        let url = format!("{}/api/generate", self.config.ollama_url);
        let parsed: GenerateResponse = self
            .post_json(
                &url,
                json!({
                    "model": self.config.gen_model,
                    "system": system,
                    "prompt": prompt,
                    "stream": false,
                }),
            )
            .await?;

        if parsed.response.trim().is_empty() {
            return Err(AdapterError::permanent("model returned an empty response"));
        }
        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
