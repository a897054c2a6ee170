use futures::future::BoxFuture;

use crate::error::ServiceError;
use crate::types::Prompt;

/// Maps texts to fixed-length vectors.
///
/// Implementations must preserve input order and return vectors of exactly
/// `dim()` components for a given `model_id()`.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the backend and model, e.g. `openai:text-embedding-3-small`.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>, ServiceError>>;
}

/// Produces text from a prompt with a single model call.
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;
    fn generate<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, Result<String, ServiceError>>;
}

impl<T: Embedder + ?Sized> Embedder for std::sync::Arc<T> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }
    fn dim(&self) -> usize {
        (**self).dim()
    }
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>, ServiceError>> {
        (**self).embed_batch(texts)
    }
}

impl<T: Generator + ?Sized> Generator for std::sync::Arc<T> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }
    fn generate<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, Result<String, ServiceError>> {
        (**self).generate(prompt)
    }
}
