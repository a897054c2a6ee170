use std::fs;

use folio_core::types::PROJECT_INDEX_SOURCE;
use folio_core::{BatchReport, ChunkKind, Document, Loader, ProjectIdentifier, Splitter, SplitterConfig, Stage};
use tempfile::TempDir;

fn load_and_split(root: &std::path::Path, splitter: &Splitter) -> (Vec<folio_core::Chunk>, BatchReport) {
    let loader = Loader::default();
    let mut report = BatchReport::default();
    let docs = report.fold(
        Stage::Load,
        loader
            .documents(root)
            .unwrap()
            .map(|r| match r {
                Ok(doc) => (doc.path.display().to_string(), Ok(doc)),
                Err(e) => (e.path.display().to_string(), Err(e.into())),
            }),
    );
    report.documents = docs.len();
    let per_doc = report.fold(
        Stage::Split,
        docs.iter().map(|d| (d.path.display().to_string(), splitter.split(d).map_err(Into::into))),
    );
    let chunks: Vec<_> = per_doc.into_iter().flatten().collect();
    report.chunks = chunks.len();
    (chunks, report)
}

#[test]
fn readme_project_scenario() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("a")).unwrap();
    fs::write(tmp.path().join("a/README.md"), "# Orion\nOrion schedules telescope time.\n\nIt is written in Rust.\n").unwrap();
    fs::write(tmp.path().join("a/notes.md"), "Some loose notes without any heading.\n").unwrap();

    let splitter = Splitter::new(SplitterConfig::default()).unwrap();
    let (chunks, report) = load_and_split(tmp.path(), &splitter);
    assert!(report.is_clean());
    assert_eq!(report.documents, 2);

    let batch = ProjectIdentifier::new().identify(chunks);
    for chunk in &batch.chunks {
        if chunk.source_path.ends_with("README.md") {
            assert_eq!(chunk.project_name.as_deref(), Some("Orion"));
        } else {
            assert!(chunk.source_path.ends_with("notes.md"));
            assert_eq!(chunk.project_name, None);
        }
    }
    let all = batch.into_chunks();
    let indexes: Vec<_> = all.iter().filter(|c| c.chunk_kind == ChunkKind::ProjectIndex).collect();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].source_path, PROJECT_INDEX_SOURCE);
    assert!(indexes[0].text.contains("Orion"));
}

#[test]
fn bad_files_are_reported_and_skipped() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("broken.json"), "{ not json").unwrap();
    fs::write(tmp.path().join("photo.bin"), [0u8, 1, 2, 3]).unwrap();
    fs::write(tmp.path().join("ok.txt"), "plain text survives").unwrap();

    let splitter = Splitter::new(SplitterConfig::default()).unwrap();
    let (chunks, report) = load_and_split(tmp.path(), &splitter);
    assert_eq!(report.failed(Stage::Load), 1);
    assert_eq!(report.failed(Stage::Split), 1);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "plain text survives");
}

#[test]
fn windows_preserve_content_modulo_whitespace() {
    let text: String = (0..300).map(|i| format!("token{i} ")).collect::<String>() + "\n\nfinal paragraph here";
    let splitter = Splitter::new(SplitterConfig { chunk_size: 120, chunk_overlap: 30 }).unwrap();
    let chunks = splitter.split(&Document::new("long.txt", text.clone())).unwrap();
    assert!(chunks.len() > 5);

    let words: Vec<&str> = text.split_whitespace().collect();
    let mut pos = 0usize;
    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 120);
        for w in chunk.text.split_whitespace() {
            if pos < words.len() && words[pos] == w {
                pos += 1;
            }
        }
    }
    assert_eq!(pos, words.len(), "every word appears in order across chunks");
    let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
}
