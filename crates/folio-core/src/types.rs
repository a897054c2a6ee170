//! Domain types shared by the loader, splitter, embedder and index.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Source path recorded on the synthesized project-index chunk.
pub const PROJECT_INDEX_SOURCE: &str = "project_index";

/// Raw text read from one file. Discarded once split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub raw_text: String,
    /// Lower-cased extension without the dot; empty when the file has none.
    pub extension: String,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, raw_text: impl Into<String>) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        Self { path, raw_text: raw_text.into(), extension }
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }
}

/// How a chunk was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    HeaderSection,
    FixedWindow,
    ProjectIndex,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeaderSection => "header_section",
            Self::FixedWindow => "fixed_window",
            Self::ProjectIndex => "project_index",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "header_section" => Some(Self::HeaderSection),
            "fixed_window" => Some(Self::FixedWindow),
            "project_index" => Some(Self::ProjectIndex),
            _ => None,
        }
    }
}

/// A bounded span of a document; the unit of embedding and retrieval.
///
/// - `source_path`: path of the originating file (or `project_index`)
/// - `chunk_index`: 0-based position within the source document
/// - `headings`: enclosing markdown headings, outermost first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source_path: String,
    pub chunk_index: usize,
    pub project_name: Option<String>,
    pub chunk_kind: ChunkKind,
    #[serde(default)]
    pub headings: Vec<String>,
}

impl Chunk {
    pub fn new(
        text: impl Into<String>,
        source_path: impl Into<String>,
        chunk_index: usize,
        chunk_kind: ChunkKind,
    ) -> Result<Self> {
        let text = text.into();
        let source_path = source_path.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidChunk(format!("empty text for {source_path}#{chunk_index}")));
        }
        if source_path.is_empty() {
            return Err(Error::InvalidChunk("missing source path".to_string()));
        }
        Ok(Self { text, source_path, chunk_index, project_name: None, chunk_kind, headings: Vec::new() })
    }

    #[must_use]
    pub fn with_headings(mut self, headings: Vec<String>) -> Self {
        self.headings = headings;
        self
    }

    #[must_use]
    pub fn with_project(mut self, project: Option<String>) -> Self {
        self.project_name = project;
        self
    }

    pub fn is_project_index(&self) -> bool {
        self.chunk_kind == ChunkKind::ProjectIndex
    }

    pub fn source_file_name(&self) -> &str {
        Path::new(&self.source_path).file_name().and_then(|n| n.to_str()).unwrap_or(&self.source_path)
    }
}

/// An embedded chunk as stored in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// One search hit. `score` is higher-is-better regardless of distance metric.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Hits ordered by descending score, at most `k` long.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct QueryResult {
    pub hits: Vec<ScoredChunk>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.hits.iter().map(|h| &h.chunk)
    }
}

/// Distance metric used by the vector index.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    #[default]
    Cosine,
    L2,
}

impl Distance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Some(Self::Cosine),
            "l2" | "euclidean" => Some(Self::L2),
            _ => None,
        }
    }
}

/// Prompt sent to a generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

/// Result of answering a query.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub summary: String,
    pub sources: Vec<Chunk>,
}
