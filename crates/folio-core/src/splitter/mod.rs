//! Format-aware document splitting.
//!
//! Markdown is cut at heading boundaries, JSON is rendered record by record,
//! and everything else falls back to overlapping fixed-size windows. Sizes
//! are measured in characters.

mod json;
pub mod markdown;
mod window;

pub use markdown::parse_heading;
pub(crate) use markdown::heading_lines;
pub use window::window_ranges;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, SplitError};
use crate::types::{Chunk, ChunkKind, Document};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

impl SplitterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("splitter.chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "splitter.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Splitter {
    config: SplitterConfig,
}

impl Splitter {
    pub fn new(config: SplitterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split one document into chunks with contiguous 0-based indices.
    pub fn split(&self, doc: &Document) -> std::result::Result<Vec<Chunk>, SplitError> {
        if doc.raw_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let pieces = match doc.extension.as_str() {
            "md" | "markdown" => self.markdown_pieces(&doc.raw_text),
            "json" => self.json_pieces(doc)?,
            _ => self.window_pieces(&doc.raw_text, &[]),
        };

        let source = doc.path.to_string_lossy().into_owned();
        let mut chunks = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let chunk = Chunk::new(piece.text, source.as_str(), chunks.len(), piece.kind)
                .map_err(|e| SplitError::new(&doc.path, e.to_string()))?
                .with_headings(piece.headings);
            chunks.push(chunk);
        }
        tracing::debug!(path = %doc.path.display(), chunks = chunks.len(), "split document");
        Ok(chunks)
    }

    fn markdown_pieces(&self, text: &str) -> Vec<Piece> {
        let mut out = Vec::new();
        for section in markdown::sections(text) {
            let body = text[section.range.clone()].trim();
            let fits = body.chars().count() <= self.config.chunk_size;
            if section.starts_with_heading && fits {
                out.push(Piece {
                    text: body.to_string(),
                    kind: ChunkKind::HeaderSection,
                    headings: section.headings,
                });
            } else {
                out.extend(self.window_pieces(body, &section.headings));
            }
        }
        out
    }

    fn json_pieces(&self, doc: &Document) -> std::result::Result<Vec<Piece>, SplitError> {
        let value: serde_json::Value = serde_json::from_str(&doc.raw_text)
            .map_err(|e| SplitError::new(&doc.path, format!("malformed JSON: {e}")))?;
        Ok(json::records(&value)
            .iter()
            .flat_map(|record| self.window_pieces(record, &[]))
            .collect())
    }

    fn window_pieces(&self, text: &str, headings: &[String]) -> Vec<Piece> {
        window_ranges(text, self.config.chunk_size, self.config.chunk_overlap)
            .into_iter()
            .map(|r| text[r].trim())
            .filter(|t| !t.is_empty())
            .map(|t| Piece { text: t.to_string(), kind: ChunkKind::FixedWindow, headings: headings.to_vec() })
            .collect()
    }
}

struct Piece {
    text: String,
    kind: ChunkKind,
    headings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> Splitter {
        Splitter::new(SplitterConfig { chunk_size: size, chunk_overlap: overlap }).unwrap()
    }

    #[test]
    fn rejects_overlap_not_below_size() {
        let err = Splitter::new(SplitterConfig { chunk_size: 100, chunk_overlap: 100 }).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(Splitter::new(SplitterConfig { chunk_size: 0, chunk_overlap: 0 }).is_err());
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let s = Splitter::new(SplitterConfig::default()).unwrap();
        assert!(s.split(&Document::new("notes.md", "   \n\n ")).unwrap().is_empty());
        assert!(s.split(&Document::new("notes.txt", "")).unwrap().is_empty());
    }

    #[test]
    fn section_at_exactly_chunk_size_is_not_resplit() {
        let body = format!("# T\n{}", "x".repeat(16));
        assert_eq!(body.chars().count(), 20);
        let chunks = splitter(20, 5).split(&Document::new("a.md", body.clone())).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_kind, ChunkKind::HeaderSection);
        assert_eq!(chunks[0].text, body);

        let longer = format!("# T\n{}", "x y ".repeat(10));
        let chunks = splitter(20, 5).split(&Document::new("a.md", longer)).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chunk_kind == ChunkKind::FixedWindow));
        assert!(chunks.iter().all(|c| c.headings == vec!["T".to_string()]));
    }

    #[test]
    fn markdown_sections_keep_heading_lines_and_hierarchy() {
        let md = "# Orion\nA telescope scheduler.\n## Setup\nRun it.\n";
        let chunks = splitter(1000, 200).split(&Document::new("Orion_README.md", md)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "# Orion\nA telescope scheduler.");
        assert_eq!(chunks[1].text, "## Setup\nRun it.");
        assert_eq!(chunks[1].headings, vec!["Orion".to_string(), "Setup".to_string()]);
        assert_eq!(chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn preamble_without_heading_is_windowed() {
        let md = "Just a preface.\n# Title\nBody.\n";
        let chunks = splitter(1000, 200).split(&Document::new("a.md", md)).unwrap();
        assert_eq!(chunks[0].chunk_kind, ChunkKind::FixedWindow);
        assert_eq!(chunks[0].text, "Just a preface.");
        assert_eq!(chunks[1].chunk_kind, ChunkKind::HeaderSection);
    }

    #[test]
    fn json_records_become_chunks() {
        let raw = r#"[{"name": "Orion", "description": "scheduler"}, {"name": "Vega"}]"#;
        let chunks = splitter(1000, 200).split(&Document::new("github_repositories.json", raw)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "name: Orion\ndescription: scheduler");
        assert_eq!(chunks[1].text, "name: Vega");
        assert_eq!(chunks[1].chunk_index, 1);
    }

    #[test]
    fn malformed_json_is_a_split_error() {
        let err = splitter(1000, 200).split(&Document::new("broken.json", "{\"name\": ")).unwrap_err();
        assert!(err.reason.contains("malformed JSON"));
        assert!(err.path.ends_with("broken.json"));
    }

    #[test]
    fn plain_text_windows_respect_size() {
        let text = "word ".repeat(100);
        let chunks = splitter(50, 10).split(&Document::new("notes.txt", text)).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 50));
        assert!(chunks.iter().all(|c| c.chunk_kind == ChunkKind::FixedWindow));
    }
}
