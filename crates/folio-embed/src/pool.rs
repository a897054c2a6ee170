//! Batched, bounded-concurrency embedding of chunk sequences.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;

use folio_core::{BatchReport, Chunk, Embedder, Error, Exhausted, IndexEntry, Result, RetryPolicy, ServiceError, Stage};

pub struct EmbedPool {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    concurrency: usize,
    retry: RetryPolicy,
    progress: Option<ProgressBar>,
}

impl EmbedPool {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize, concurrency: usize, retry: RetryPolicy) -> Self {
        Self { embedder, batch_size: batch_size.max(1), concurrency: concurrency.max(1), retry, progress: None }
    }

    /// Advance `bar` by the number of chunks in each finished batch.
    #[must_use]
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed `chunks`, keeping input order. Chunks that cannot be embedded
    /// are left out of the result and recorded in the report.
    pub async fn embed_chunks(&self, chunks: Vec<Chunk>) -> (Vec<IndexEntry>, BatchReport) {
        let mut batches = Vec::new();
        let mut iter = chunks.into_iter().peekable();
        while iter.peek().is_some() {
            batches.push(iter.by_ref().take(self.batch_size).collect::<Vec<_>>());
        }
        tracing::info!(
            batches = batches.len(),
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            model = self.embedder.model_id(),
            "embedding chunks"
        );

        let outcomes: Vec<(Vec<IndexEntry>, BatchReport)> = stream::iter(batches)
            .map(|batch| self.embed_group(batch))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut entries = Vec::new();
        let mut report = BatchReport::default();
        for (batch_entries, batch_report) in outcomes {
            entries.extend(batch_entries);
            report.merge(batch_report);
        }
        report.indexed = entries.len();
        (entries, report)
    }

    /// Embed a single query string under the retry policy.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self
            .retry
            .run("embed", || self.embedder.embed_batch(&texts))
            .await
            .map_err(|e| e.into_error(Error::Embedding))?;
        let vector = vectors.pop().ok_or_else(|| Error::Embedding(ServiceError::Malformed("no vector returned".into())))?;
        self.check_dim(&vector).map_err(Error::Embedding)?;
        Ok(vector)
    }

    async fn embed_group(&self, batch: Vec<Chunk>) -> (Vec<IndexEntry>, BatchReport) {
        let mut report = BatchReport::default();
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let outcome = self.call(&texts).await;

        let entries = match outcome {
            Ok(vectors) => self.pair(batch, vectors, &mut report),
            Err(exhausted) if exhausted.last.is_transient() || batch.len() == 1 => {
                for chunk in &batch {
                    report.record_failure(Stage::Embed, item(chunk), exhausted.clone().into_error(Error::Embedding));
                }
                Vec::new()
            }
            Err(exhausted) => {
                tracing::debug!(error = %exhausted.last, size = batch.len(), "batch rejected, embedding chunks one by one");
                let mut entries = Vec::new();
                for chunk in batch {
                    let single = [chunk.text.clone()];
                    match self.call(&single).await {
                        Ok(vectors) => entries.extend(self.pair(vec![chunk], vectors, &mut report)),
                        Err(e) => report.record_failure(Stage::Embed, item(&chunk), e.into_error(Error::Embedding)),
                    }
                }
                entries
            }
        };
        if let Some(bar) = &self.progress {
            bar.inc(texts.len() as u64);
        }
        (entries, report)
    }

    /// One retried request; a reply with the wrong number of vectors counts as malformed.
    async fn call(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, Exhausted> {
        let vectors = self.retry.run("embed", || self.embedder.embed_batch(texts)).await?;
        if vectors.len() != texts.len() {
            return Err(Exhausted {
                operation: "embed",
                attempts: 1,
                last: ServiceError::Malformed(format!("expected {} vectors, got {}", texts.len(), vectors.len())),
            });
        }
        Ok(vectors)
    }

    fn pair(&self, batch: Vec<Chunk>, vectors: Vec<Vec<f32>>, report: &mut BatchReport) -> Vec<IndexEntry> {
        let mut entries = Vec::with_capacity(batch.len());
        for (chunk, vector) in batch.into_iter().zip(vectors) {
            match self.check_dim(&vector) {
                Ok(()) => entries.push(IndexEntry { vector, chunk }),
                Err(e) => report.record_failure(Stage::Embed, item(&chunk), Error::Embedding(e)),
            }
        }
        entries
    }

    fn check_dim(&self, vector: &[f32]) -> std::result::Result<(), ServiceError> {
        let dim = self.embedder.dim();
        if vector.len() == dim {
            Ok(())
        } else {
            Err(ServiceError::Malformed(format!("expected {dim} dimensions, got {}", vector.len())))
        }
    }
}

fn item(chunk: &Chunk) -> String {
    format!("{}#{}", chunk.source_path, chunk.chunk_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashEmbedder;
    use folio_core::ChunkKind;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n).map(|i| Chunk::new(format!("chunk number {i}"), "notes.md", i, ChunkKind::FixedWindow).unwrap()).collect()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::immediate(3, Duration::from_secs(5))
    }

    /// Fails the first `failures` calls with a rate limit.
    struct Flaky {
        inner: HashEmbedder,
        failures: u32,
        calls: AtomicU32,
    }

    impl Embedder for Flaky {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
        fn dim(&self) -> usize {
            self.inner.dim()
        }
        fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, std::result::Result<Vec<Vec<f32>>, ServiceError>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Box::pin(async { Err::<Vec<Vec<f32>>, _>(ServiceError::RateLimited) })
            } else {
                self.inner.embed_batch(texts)
            }
        }
    }

    /// Rejects any batch containing the word "poison".
    struct Picky(HashEmbedder);

    impl Embedder for Picky {
        fn model_id(&self) -> &str {
            self.0.model_id()
        }
        fn dim(&self) -> usize {
            self.0.dim()
        }
        fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, std::result::Result<Vec<Vec<f32>>, ServiceError>> {
            if texts.iter().any(|t| t.contains("poison")) {
                Box::pin(async { Err::<Vec<Vec<f32>>, _>(ServiceError::Rejected { status: 400, message: "bad input".into() }) })
            } else {
                self.0.embed_batch(texts)
            }
        }
    }

    /// Returns vectors one component short.
    struct Short;

    impl Embedder for Short {
        fn model_id(&self) -> &str {
            "short"
        }
        fn dim(&self) -> usize {
            4
        }
        fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, std::result::Result<Vec<Vec<f32>>, ServiceError>> {
            Box::pin(futures::future::ready(Ok::<_, ServiceError>(vec![vec![0.5f32; 3]; texts.len()])))
        }
    }

    #[tokio::test]
    async fn output_keeps_input_order_across_batches() {
        let pool = EmbedPool::new(Arc::new(HashEmbedder::new(16)), 2, 3, policy());
        let (entries, report) = pool.embed_chunks(chunks(7)).await;
        assert!(report.is_clean());
        assert_eq!(report.indexed, 7);
        let order: Vec<usize> = entries.iter().map(|e| e.chunk.chunk_index).collect();
        assert_eq!(order, (0..7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn two_transient_failures_then_success() {
        let flaky = Flaky { inner: HashEmbedder::new(16), failures: 2, calls: AtomicU32::new(0) };
        let pool = EmbedPool::new(Arc::new(flaky), 8, 1, policy());
        let (entries, report) = pool.embed_chunks(chunks(3)).await;
        assert_eq!(entries.len(), 3);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn exhausted_retries_drop_the_batch() {
        let flaky = Flaky { inner: HashEmbedder::new(16), failures: u32::MAX, calls: AtomicU32::new(0) };
        let pool = EmbedPool::new(Arc::new(flaky), 8, 1, policy());
        let (entries, report) = pool.embed_chunks(chunks(2)).await;
        assert!(entries.is_empty());
        assert_eq!(report.failed(Stage::Embed), 2);
        assert!(matches!(report.failures[0].error, Error::Embedding(ServiceError::RateLimited)));
        assert_eq!(report.failures[0].item, "notes.md#0");
    }

    #[tokio::test]
    async fn rejected_batch_falls_back_to_single_chunks() {
        let mut input = chunks(3);
        input[1] = Chunk::new("poison pill", "notes.md", 1, ChunkKind::FixedWindow).unwrap();
        let pool = EmbedPool::new(Arc::new(Picky(HashEmbedder::new(16))), 3, 1, policy());
        let (entries, report) = pool.embed_chunks(input).await;
        let kept: Vec<usize> = entries.iter().map(|e| e.chunk.chunk_index).collect();
        assert_eq!(kept, vec![0, 2]);
        assert_eq!(report.failed(Stage::Embed), 1);
        assert_eq!(report.failures[0].item, "notes.md#1");
    }

    #[tokio::test]
    async fn wrong_dimension_is_an_embedding_error() {
        let pool = EmbedPool::new(Arc::new(Short), 4, 1, policy());
        let (entries, report) = pool.embed_chunks(chunks(2)).await;
        assert!(entries.is_empty());
        assert_eq!(report.failed(Stage::Embed), 2);
        assert!(pool.embed_query("q").await.is_err());
    }
}
