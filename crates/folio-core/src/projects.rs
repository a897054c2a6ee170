//! Project-name inference over one batch of chunks.
//!
//! Chunks are tagged with the project they describe where that can be
//! inferred, and a single synthesized chunk listing every project is added
//! so listing questions can be answered from one retrieval hit.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::splitter::heading_lines;
use crate::types::{Chunk, ChunkKind, PROJECT_INDEX_SOURCE};

/// Heading-derived names must be 4 to 49 characters long.
const NAME_CHARS: std::ops::RangeInclusive<usize> = 4..=49;

pub const PROJECT_INDEX_TITLE: &str = "# All Identified Projects";

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectBatch {
    pub chunks: Vec<Chunk>,
    /// Present for every non-empty batch.
    pub project_index: Option<Chunk>,
    pub projects: BTreeSet<String>,
}

impl ProjectBatch {
    /// All chunks with the project index appended last.
    pub fn into_chunks(self) -> Vec<Chunk> {
        let mut chunks = self.chunks;
        chunks.extend(self.project_index);
        chunks
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectIdentifier;

impl ProjectIdentifier {
    pub fn new() -> Self {
        Self
    }

    pub fn identify(&self, mut chunks: Vec<Chunk>) -> ProjectBatch {
        let mut projects = BTreeSet::new();
        let readme_names = readme_projects(&chunks);

        for chunk in chunks.iter_mut().filter(|c| !c.is_project_index()) {
            let file_name = chunk.source_file_name().to_string();
            let name = if let Some(name) = readme_names.get(&chunk.source_path) {
                Some(name.clone())
            } else if is_project_export(&file_name) {
                let names = export_names(&chunk.text);
                projects.extend(names.iter().cloned());
                names.into_iter().next()
            } else {
                heading_project(chunk)
            };
            if let Some(n) = &name {
                projects.insert(n.clone());
            }
            chunk.project_name = name;
        }

        let project_index = if chunks.is_empty() { None } else { Some(index_chunk(&projects)) };
        tracing::info!(projects = projects.len(), chunks = chunks.len(), "identified projects");
        ProjectBatch { chunks, project_index, projects }
    }
}

/// `README.md`, `readme.markdown`, `<name>_README.md` and similar.
fn readme_prefix(file_name: &str) -> Option<&str> {
    let stem = Path::new(file_name).file_stem().and_then(|s| s.to_str())?;
    let ext = Path::new(file_name).extension().and_then(|s| s.to_str()).unwrap_or("");
    if !matches!(ext.to_ascii_lowercase().as_str(), "md" | "markdown" | "") {
        return None;
    }
    if stem.eq_ignore_ascii_case("readme") {
        return Some("");
    }
    let lower = stem.to_ascii_lowercase();
    lower.strip_suffix("_readme").map(|p| &stem[..p.len()])
}

/// Project name for each README-like source: its first H1, else the file-name prefix.
fn readme_projects(chunks: &[Chunk]) -> HashMap<String, String> {
    let mut first_h1: HashMap<&str, Option<&str>> = HashMap::new();
    for chunk in chunks {
        if readme_prefix(chunk.source_file_name()).is_none() {
            continue;
        }
        let slot = first_h1.entry(chunk.source_path.as_str()).or_insert(None);
        if slot.is_none() {
            *slot = heading_lines(&chunk.text).find(|(lvl, _)| *lvl == 1).map(|(_, t)| t);
        }
    }
    first_h1
        .into_iter()
        .filter_map(|(source, h1)| {
            let name = match h1 {
                Some(t) => t.to_string(),
                None => readme_prefix(Path::new(source).file_name()?.to_str()?)?.to_string(),
            };
            (!name.is_empty()).then(|| (source.to_string(), name))
        })
        .collect()
}

fn is_project_export(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.ends_with(".json") && (lower.contains("repositories") || lower.contains("projects"))
}

/// Values of top-level `name:` / `project:` lines in a rendered JSON record.
/// Nested fields are indented by the renderer and never match.
fn export_names(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("name:").or_else(|| line.strip_prefix("project:")))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_markdown(file_name: &str) -> bool {
    let ext = Path::new(file_name).extension().and_then(|s| s.to_str()).unwrap_or("");
    matches!(ext.to_ascii_lowercase().as_str(), "md" | "markdown")
}

/// Last H1/H2 line of a markdown chunk, else the innermost of the top two
/// enclosing headings. `#` lines in other files are comments, not headings.
fn heading_project(chunk: &Chunk) -> Option<String> {
    let in_text = if is_markdown(chunk.source_file_name()) {
        heading_lines(&chunk.text).filter(|(lvl, _)| *lvl <= 2).map(|(_, t)| t).last()
    } else {
        None
    };
    let candidate = in_text.or_else(|| chunk.headings.iter().take(2).last().map(String::as_str))?;
    NAME_CHARS.contains(&candidate.chars().count()).then(|| candidate.to_string())
}

fn index_chunk(projects: &BTreeSet<String>) -> Chunk {
    let mut text = format!("{PROJECT_INDEX_TITLE}\n\n");
    if projects.is_empty() {
        text.push_str("No projects identified.");
    } else {
        let lines: Vec<String> = projects.iter().enumerate().map(|(i, p)| format!("{}. {p}", i + 1)).collect();
        text.push_str(&lines.join("\n"));
    }
    Chunk {
        text,
        source_path: PROJECT_INDEX_SOURCE.to_string(),
        chunk_index: 0,
        project_name: None,
        chunk_kind: ChunkKind::ProjectIndex,
        headings: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::{Splitter, SplitterConfig};
    use crate::types::Document;

    fn chunk(source: &str, idx: usize, text: &str) -> Chunk {
        Chunk::new(text, source, idx, ChunkKind::HeaderSection).unwrap()
    }

    #[test]
    fn readme_h1_names_every_chunk_of_the_document() {
        let chunks = vec![
            chunk("a/README.md", 0, "# Orion\nScheduler."),
            chunk("a/README.md", 1, "## Install\ncargo install orion"),
            chunk("a/notes.md", 0, "loose thoughts"),
        ];
        let batch = ProjectIdentifier::new().identify(chunks);
        assert_eq!(batch.chunks[0].project_name.as_deref(), Some("Orion"));
        assert_eq!(batch.chunks[1].project_name.as_deref(), Some("Orion"));
        assert_eq!(batch.chunks[2].project_name, None);
        let index = batch.project_index.expect("index chunk");
        assert_eq!(index.text, "# All Identified Projects\n\n1. Orion");
        assert_eq!(index.source_path, PROJECT_INDEX_SOURCE);
    }

    #[test]
    fn readme_without_h1_falls_back_to_file_prefix() {
        let batch = ProjectIdentifier::new().identify(vec![chunk("r/Vega_README.md", 0, "no heading here")]);
        assert_eq!(batch.chunks[0].project_name.as_deref(), Some("Vega"));
        assert!(batch.projects.contains("Vega"));
    }

    #[test]
    fn export_json_names_projects() {
        let c = Chunk::new("description: x\nname: Lyra", "data/repositories.json", 0, ChunkKind::FixedWindow).unwrap();
        let batch = ProjectIdentifier::new().identify(vec![c]);
        assert_eq!(batch.chunks[0].project_name.as_deref(), Some("Lyra"));
    }

    #[test]
    fn nested_export_fields_are_not_projects() {
        let raw = r#"[{"name":"Orion","license":{"key":"mit","name":"MIT License"},"owner":{"login":"ada","name":"Ada Lovelace"}}]"#;
        let doc = Document::new("data/github_repositories.json", raw);
        let chunks = Splitter::new(SplitterConfig::default()).unwrap().split(&doc).unwrap();
        let batch = ProjectIdentifier::new().identify(chunks);
        assert_eq!(batch.chunks[0].project_name.as_deref(), Some("Orion"));
        assert_eq!(batch.projects, BTreeSet::from(["Orion".to_string()]));
        assert_eq!(batch.project_index.unwrap().text, "# All Identified Projects\n\n1. Orion");
    }

    #[test]
    fn comments_in_code_blocks_are_not_headings() {
        let md = "# Orion Scheduler\nPlans telescope time.\n```bash\n# install the toolchain\ncargo build\n```\n";
        let chunks = Splitter::new(SplitterConfig::default()).unwrap().split(&Document::new("docs/orion.md", md)).unwrap();
        assert_eq!(chunks[0].headings, vec!["Orion Scheduler".to_string()]);
        let batch = ProjectIdentifier::new().identify(chunks);
        assert_eq!(batch.chunks[0].project_name.as_deref(), Some("Orion Scheduler"));
        assert!(!batch.projects.contains("install the toolchain"));
    }

    #[test]
    fn hash_comments_outside_markdown_name_nothing() {
        let chunks = vec![
            Chunk::new("# Build the release image\ndocker build .", "scripts/release.sh", 0, ChunkKind::FixedWindow).unwrap(),
            Chunk::new("# Tooling defaults\n[lint]\nstrict = true", "config/lint.toml", 0, ChunkKind::FixedWindow).unwrap(),
            Chunk::new("## Orion helpers\ndef plan(): ...", "orion/plan.py", 0, ChunkKind::FixedWindow).unwrap(),
        ];
        let batch = ProjectIdentifier::new().identify(chunks);
        assert!(batch.chunks.iter().all(|c| c.project_name.is_none()));
        assert!(batch.projects.is_empty());
    }

    #[test]
    fn nearest_heading_with_length_bounds() {
        let chunks = vec![
            chunk("n.md", 0, "# Alpha Project\nbody\n## Beta Engine\nmore"),
            chunk("n.md", 1, "# Abc\nshort name"),
            Chunk::new("windowed body", "n.md", 2, ChunkKind::FixedWindow)
                .unwrap()
                .with_headings(vec!["Gamma Tool".into(), "Usage".into(), "Flags".into()]),
        ];
        let batch = ProjectIdentifier::new().identify(chunks);
        assert_eq!(batch.chunks[0].project_name.as_deref(), Some("Beta Engine"));
        assert_eq!(batch.chunks[1].project_name, None);
        assert_eq!(batch.chunks[2].project_name.as_deref(), Some("Usage"));
    }

    #[test]
    fn index_is_sorted_and_deduplicated() {
        let chunks = vec![
            chunk("z/README.md", 0, "# Zeta"),
            chunk("a/README.md", 0, "# Andromeda"),
            chunk("x.md", 0, "## Zeta"),
        ];
        let batch = ProjectIdentifier::new().identify(chunks);
        let index = batch.project_index.unwrap();
        assert_eq!(index.text, "# All Identified Projects\n\n1. Andromeda\n2. Zeta");
        assert_eq!(index.chunk_kind, ChunkKind::ProjectIndex);
    }

    #[test]
    fn empty_batches_get_no_index_and_unnamed_batches_get_placeholder() {
        assert!(ProjectIdentifier::new().identify(Vec::new()).project_index.is_none());
        let batch = ProjectIdentifier::new().identify(vec![chunk("n.txt", 0, "plain")]);
        let all = batch.into_chunks();
        assert_eq!(all.len(), 2);
        assert!(all[1].text.ends_with("No projects identified."));
    }
}
