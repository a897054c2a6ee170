//! Query-time retrieval and answer generation.

use std::sync::Arc;

use folio_core::{Answer, Chunk, Embedder, Error, Generator, QueryResult, Result, RetryPolicy};
use folio_embed::EmbedPool;
use folio_vector::{IndexHandle, VectorIndex};

use crate::prompt::{build_prompt, parse_answer};

pub const DEFAULT_TOP_K: usize = 10;

pub struct Retriever {
    handle: Arc<IndexHandle>,
    embed: EmbedPool,
    generator: Arc<dyn Generator>,
    retry: RetryPolicy,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        handle: Arc<IndexHandle>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        retry: RetryPolicy,
    ) -> Self {
        Self { handle, embed: EmbedPool::new(embedder, 1, 1, retry), generator, retry, top_k: DEFAULT_TOP_K }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Nearest chunks for `query` against the current index snapshot.
    pub async fn retrieve(&self, query: &str) -> Result<QueryResult> {
        let index = self.handle.snapshot();
        self.search(&index, query).await
    }

    /// Retrieve context, ask the generator once and split the reply into
    /// answer and summary. The project listing is always part of the context
    /// when the index has one.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let index = self.handle.snapshot();
        let hits = self.search(&index, query).await?;

        let mut sources: Vec<Chunk> = hits.hits.into_iter().map(|h| h.chunk).collect();
        if !sources.iter().any(Chunk::is_project_index) {
            if let Some(listing) = index.project_index() {
                sources.push(listing.clone());
            }
        }
        tracing::debug!(sources = sources.len(), "context assembled");

        let prompt = build_prompt(query, &sources);
        let raw = self
            .retry
            .run("generate", || self.generator.generate(&prompt))
            .await
            .map_err(|e| e.into_error(Error::Generation))?;
        let (answer, summary) = parse_answer(&raw);
        tracing::info!(model = self.generator.model_id(), sources = sources.len(), "answer generated");
        Ok(Answer { answer, summary, sources })
    }

    async fn search(&self, index: &VectorIndex, query: &str) -> Result<QueryResult> {
        let query_model = self.embed.embedder().model_id();
        if query_model != index.model_id() {
            return Err(Error::ModelMismatch {
                index_model: index.model_id().to_string(),
                query_model: query_model.to_string(),
            });
        }
        let vector = self.embed.embed_query(query).await?;
        let hits = index.search(&vector, self.top_k)?;
        tracing::debug!(hits = hits.len(), k = self.top_k, "index searched");
        Ok(hits)
    }
}
