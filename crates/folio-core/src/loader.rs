//! Recursive directory loader.
//!
//! Walks a root directory in file-name order and reads each regular file
//! into a [`Document`]. Markdown, JSON and plain-text formats are read
//! directly; any other extension is handed to an [`ExternalLoader`].
//! A file that cannot be read yields a [`LoadError`] and the walk continues.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, LoadError, Result};
use crate::types::Document;

/// Extensions read directly as UTF-8 text.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "md", "markdown", "json", "txt", "text", "rst", "csv", "tex", "yaml", "yml", "toml", "html",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
    /// Descend into dot-directories and read dotfiles.
    pub include_hidden: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { max_file_size: 50 * 1024 * 1024, include_hidden: false }
    }
}

/// Reads formats the loader does not understand natively.
pub trait ExternalLoader: Send + Sync {
    fn load(&self, path: &Path) -> std::result::Result<String, LoadError>;
}

/// Fallback for unknown extensions: accept the file only if it decodes as text.
#[derive(Debug, Default)]
pub struct PlainTextFallback;

impl ExternalLoader for PlainTextFallback {
    fn load(&self, path: &Path) -> std::result::Result<String, LoadError> {
        let bytes = fs::read(path).map_err(|e| LoadError::new(path, e.to_string()))?;
        decode_text(path, bytes)
    }
}

/// Extracts text from PDFs, falling back to plain text for everything else.
#[cfg(feature = "pdf")]
#[derive(Debug, Default)]
pub struct PdfLoader;

#[cfg(feature = "pdf")]
impl ExternalLoader for PdfLoader {
    fn load(&self, path: &Path) -> std::result::Result<String, LoadError> {
        let is_pdf = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return PlainTextFallback.load(path);
        }
        pdf_extract::extract_text(path).map_err(|e| LoadError::new(path, format!("pdf extraction failed: {e}")))
    }
}

fn decode_text(path: &Path, bytes: Vec<u8>) -> std::result::Result<String, LoadError> {
    if bytes.contains(&0) {
        return Err(LoadError::new(path, "binary content"));
    }
    String::from_utf8(bytes).map_err(|_| LoadError::new(path, "not valid UTF-8 text"))
}

pub struct Loader {
    config: LoaderConfig,
    external: Arc<dyn ExternalLoader>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config, external: default_external() }
    }

    #[must_use]
    pub fn with_external(mut self, external: Arc<dyn ExternalLoader>) -> Self {
        self.external = external;
        self
    }

    /// Lazily enumerate regular files under `root`, sorted by file name.
    pub fn discover(&self, root: &Path) -> Result<impl Iterator<Item = std::result::Result<PathBuf, LoadError>>> {
        if !root.is_dir() {
            return Err(Error::NotFound(format!("source directory {}", root.display())));
        }
        let include_hidden = self.config.include_hidden;
        let walker = walkdir::WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| include_hidden || e.depth() == 0 || !is_hidden(e.file_name()));
        Ok(walker.filter_map(|entry| match entry {
            Ok(e) if e.file_type().is_file() => Some(Ok(e.into_path())),
            Ok(_) => None,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                Some(Err(LoadError::new(path, e.to_string())))
            }
        }))
    }

    /// Read one file into a document.
    pub fn load(&self, path: &Path) -> std::result::Result<Document, LoadError> {
        let meta = fs::metadata(path).map_err(|e| LoadError::new(path, e.to_string()))?;
        if meta.len() > self.config.max_file_size {
            return Err(LoadError::new(path, format!("file too large: {} bytes", meta.len())));
        }
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).unwrap_or_default();
        let text = if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            let bytes = fs::read(path).map_err(|e| LoadError::new(path, e.to_string()))?;
            decode_text(path, bytes)?
        } else {
            self.external.load(path)?
        };
        tracing::debug!(path = %path.display(), bytes = text.len(), "loaded document");
        Ok(Document::new(path, text))
    }

    /// Lazy sequence of documents (or per-file errors) under `root`.
    pub fn documents<'a>(
        &'a self,
        root: &Path,
    ) -> Result<impl Iterator<Item = std::result::Result<Document, LoadError>> + 'a> {
        Ok(self.discover(root)?.map(move |p| p.and_then(|p| self.load(&p))))
    }
}

#[cfg(feature = "pdf")]
fn default_external() -> Arc<dyn ExternalLoader> {
    Arc::new(PdfLoader)
}

#[cfg(not(feature = "pdf"))]
fn default_external() -> Arc<dyn ExternalLoader> {
    Arc::new(PlainTextFallback)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn discover_is_sorted_and_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        fs::create_dir_all(dir.join("b")).unwrap();
        fs::create_dir_all(dir.join(".git")).unwrap();
        fs::write(dir.join("b/z.md"), "z").unwrap();
        fs::write(dir.join("a.txt"), "a").unwrap();
        fs::write(dir.join(".git/config"), "x").unwrap();
        fs::write(dir.join(".env"), "SECRET=1").unwrap();

        let loader = Loader::default();
        let found: Vec<PathBuf> = loader.discover(dir).unwrap().map(|p| p.unwrap()).collect();
        assert_eq!(found, vec![dir.join("a.txt"), dir.join("b/z.md")]);
    }

    #[test]
    fn missing_root_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = Loader::default().discover(&tmp.path().join("nope")).err().expect("error");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn binary_files_are_skipped_with_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("img.png"), [0x89u8, 0x50, 0x00, 0x01]).unwrap();
        fs::write(tmp.path().join("notes.txt"), "hello").unwrap();

        let loader = Loader::default();
        let results: Vec<_> = loader.documents(tmp.path()).unwrap().collect();
        assert_eq!(results.len(), 2);
        let errs: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].path.ends_with("img.png"));
        let docs: Vec<_> = results.into_iter().filter_map(std::result::Result::ok).collect();
        assert_eq!(docs[0].raw_text, "hello");
        assert_eq!(docs[0].extension, "txt");
    }

    #[test]
    fn unknown_text_extension_uses_fallback() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("main.rs");
        fs::write(&p, "fn main() {}").unwrap();
        let doc = Loader::default().load(&p).unwrap();
        assert_eq!(doc.extension, "rs");
        assert_eq!(doc.raw_text, "fn main() {}");
    }

    #[test]
    fn oversized_files_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("big.txt");
        fs::write(&p, "0123456789").unwrap();
        let loader = Loader::new(LoaderConfig { max_file_size: 4, include_hidden: false });
        let err = loader.load(&p).unwrap_err();
        assert!(err.reason.contains("too large"));
    }
}
