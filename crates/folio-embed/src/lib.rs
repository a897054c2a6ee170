//! Embedding backends and the batch embedding pool.

pub mod hash;
pub mod http;
pub mod openai;
pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use folio_core::config::{fake_embeddings_requested, read_api_key, EmbeddingProvider, EmbeddingSettings};
use folio_core::{Embedder, Result};

pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;
pub use pool::EmbedPool;

/// Build the configured embedder. `APP_USE_FAKE_EMBEDDINGS=1` forces the
/// hashing embedder regardless of the configured provider.
pub fn embedder_from_settings(settings: &EmbeddingSettings, request_timeout: Duration) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_requested() || settings.provider == EmbeddingProvider::Hash {
        tracing::info!(dim = settings.dim, "using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let api_key = read_api_key(&settings.api_key_env)?;
    let client = http::default_client(request_timeout)?;
    tracing::info!(model = %settings.model, base_url = %settings.base_url, "using OpenAI-compatible embedder");
    Ok(Arc::new(OpenAiEmbedder::new(client, &settings.base_url, api_key, &settings.model, settings.dim)))
}
