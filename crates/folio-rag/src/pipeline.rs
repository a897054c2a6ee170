//! Offline index build: load, split, tag projects, embed, assemble.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use folio_core::{BatchReport, Chunk, Distance, Error, Loader, ProjectIdentifier, Result, Splitter, Stage};
use folio_embed::EmbedPool;
use folio_vector::{IndexHandle, IndexSchema, VectorIndex};

/// A freshly built index and what happened along the way.
#[derive(Debug)]
pub struct BuildOutcome {
    pub index: VectorIndex,
    pub report: BatchReport,
}

pub struct BuildPipeline {
    loader: Arc<Loader>,
    splitter: Arc<Splitter>,
    projects: ProjectIdentifier,
    embed: EmbedPool,
    parallel_files: usize,
    distance: Distance,
}

impl BuildPipeline {
    pub fn new(loader: Loader, splitter: Splitter, embed: EmbedPool) -> Self {
        Self {
            loader: Arc::new(loader),
            splitter: Arc::new(splitter),
            projects: ProjectIdentifier::new(),
            embed,
            parallel_files: 8,
            distance: Distance::Cosine,
        }
    }

    /// Files loaded and split at once.
    #[must_use]
    pub fn with_parallel_files(mut self, n: usize) -> Self {
        self.parallel_files = n.max(1);
        self
    }

    #[must_use]
    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    /// Build a new index from every file under `root`. Bad files and
    /// unembeddable chunks are skipped and reported; only a missing root or
    /// an index-level inconsistency fails the build.
    pub async fn build(&self, root: &Path) -> Result<BuildOutcome> {
        tracing::info!(root = %root.display(), "building index");
        let mut report = BatchReport::default();

        let discovered: Vec<_> = self.loader.discover(root)?.collect();
        let paths: Vec<PathBuf> = report.fold(
            Stage::Load,
            discovered.into_iter().map(|p| match p {
                Ok(path) => (path.display().to_string(), Ok(path)),
                Err(e) => (e.path.display().to_string(), Err(Error::Load(e))),
            }),
        );

        let per_file: Vec<(String, Result<Vec<Chunk>>)> = stream::iter(paths)
            .map(|path| self.load_and_split(path))
            .buffered(self.parallel_files)
            .collect()
            .await;

        let mut chunks = Vec::new();
        for (item, outcome) in per_file {
            match outcome {
                Ok(mut file_chunks) => {
                    report.documents += 1;
                    chunks.append(&mut file_chunks);
                }
                Err(e @ Error::Load(_)) => report.record_failure(Stage::Load, item, e),
                Err(e) => report.record_failure(Stage::Split, item, e),
            }
        }

        let batch = self.projects.identify(chunks);
        tracing::info!(projects = batch.projects.len(), "projects identified");
        let chunks = batch.into_chunks();
        report.chunks = chunks.len();

        let (entries, embed_report) = self.embed.embed_chunks(chunks).await;
        report.merge(embed_report);

        let embedder = self.embed.embedder();
        let mut index = VectorIndex::new(IndexSchema {
            dim: embedder.dim(),
            distance: self.distance,
            model_id: embedder.model_id().to_string(),
        });
        index.add(entries)?;
        report.log_summary();
        Ok(BuildOutcome { index, report })
    }

    /// Build from `root`, persist to `index_dir` and swap the result into
    /// `handle`. A failed build or write leaves both the live index and the
    /// directory as they were.
    pub async fn rebuild(&self, handle: &IndexHandle, root: &Path, index_dir: &Path) -> Result<BatchReport> {
        let mut report = None;
        let slot = &mut report;
        handle
            .rebuild(move |_previous| async move {
                let BuildOutcome { mut index, report } = self.build(root).await?;
                index.persist(index_dir).await?;
                *slot = Some(report);
                Ok(index)
            })
            .await?;
        Ok(report.unwrap_or_default())
    }

    async fn load_and_split(&self, path: PathBuf) -> (String, Result<Vec<Chunk>>) {
        let item = path.display().to_string();
        let loader = Arc::clone(&self.loader);
        let splitter = Arc::clone(&self.splitter);
        let outcome = tokio::task::spawn_blocking(move || -> Result<Vec<Chunk>> {
            let doc = loader.load(&path)?;
            let chunks = splitter.split(&doc)?;
            tracing::debug!(path = %path.display(), chunks = chunks.len(), "split document");
            Ok(chunks)
        })
        .await;
        let outcome = outcome.unwrap_or_else(|e| Err(Error::Io(std::io::Error::other(e.to_string()))));
        (item, outcome)
    }
}
