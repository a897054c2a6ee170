use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use folio_core::{Embedder, ServiceError};

use crate::http::post_json;

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dim: usize,
    model_id: String,
}

impl fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dim", &self.dim)
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbedder {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dim: usize,
    ) -> Self {
        let model = model.into();
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_id: format!("openai:{model}"),
            model,
            dim,
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let body = EmbeddingRequest { input: texts, model: &self.model };
        let url = format!("{}/embeddings", self.base_url);
        let mut resp: EmbeddingResponse = post_json(&self.client, &url, &self.api_key, &body).await?;
        if resp.data.len() != texts.len() {
            return Err(ServiceError::Malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                resp.data.len()
            )));
        }
        resp.data.sort_by_key(|d| d.index);
        Ok(resp.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>, ServiceError>> {
        Box::pin(self.request(texts))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
