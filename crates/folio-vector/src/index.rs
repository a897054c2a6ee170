use chrono::{DateTime, Utc};
use serde::Serialize;

use folio_core::{Chunk, Distance, Error, IndexEntry, QueryResult, Result, ScoredChunk};

/// What every vector in an index must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSchema {
    pub dim: usize,
    pub distance: Distance,
    /// Embedder that produced the vectors; queries must use the same one.
    pub model_id: String,
}

/// Exact (brute-force) nearest-neighbour index over embedded chunks.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    schema: IndexSchema,
    entries: Vec<IndexEntry>,
    pub(crate) built_at: Option<DateTime<Utc>>,
}

impl VectorIndex {
    pub fn new(schema: IndexSchema) -> Self {
        Self { schema, entries: Vec::new(), built_at: None }
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn model_id(&self) -> &str {
        &self.schema.model_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// When the index was last persisted or loaded from disk.
    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    /// Append entries. Nothing is added if any vector has the wrong dimension.
    pub fn add(&mut self, entries: impl IntoIterator<Item = IndexEntry>) -> Result<()> {
        let entries: Vec<IndexEntry> = entries.into_iter().collect();
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.schema.dim) {
            return Err(Error::IndexSchema(format!(
                "vector for {}#{} has {} dimensions, index expects {}",
                bad.chunk.source_path,
                bad.chunk.chunk_index,
                bad.vector.len(),
                self.schema.dim
            )));
        }
        self.entries.extend(entries);
        Ok(())
    }

    /// The k nearest entries, best first. Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<QueryResult> {
        if query.len() != self.schema.dim {
            return Err(Error::IndexSchema(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.schema.dim
            )));
        }
        let query_norm = norm(query);
        let mut ranked: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, self.distance(query, query_norm, &e.vector)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        let hits = ranked
            .into_iter()
            .take(k)
            .map(|(i, d)| ScoredChunk { chunk: self.entries[i].chunk.clone(), score: self.score(d) })
            .collect();
        Ok(QueryResult { hits })
    }

    /// The synthesized project-index chunk, if this index holds one.
    pub fn project_index(&self) -> Option<&Chunk> {
        self.entries.iter().map(|e| &e.chunk).find(|c| c.is_project_index())
    }

    /// Distinct project names recorded on chunks.
    pub fn projects(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.iter().filter_map(|e| e.chunk.project_name.as_deref()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Content digest over model, metric, chunk text and vectors, in order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.schema.model_id.as_bytes());
        hasher.update(self.schema.distance.as_str().as_bytes());
        for e in &self.entries {
            hasher.update(e.chunk.source_path.as_bytes());
            hasher.update(&(e.chunk.chunk_index as u64).to_le_bytes());
            hasher.update(e.chunk.text.as_bytes());
            for x in &e.vector {
                hasher.update(&x.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    fn distance(&self, query: &[f32], query_norm: f32, v: &[f32]) -> f32 {
        match self.schema.distance {
            Distance::Cosine => {
                let denom = query_norm * norm(v);
                let cos = if denom > 0.0 { dot(query, v) / denom } else { 0.0 };
                1.0 - cos
            }
            Distance::L2 => query.iter().zip(v).map(|(a, b)| (a - b) * (a - b)).sum::<f32>().sqrt(),
        }
    }

    fn score(&self, distance: f32) -> f32 {
        match self.schema.distance {
            Distance::Cosine => 1.0 - distance,
            Distance::L2 => 1.0 / (1.0 + distance),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}
