#![deny(unused_variables)]

pub mod config;
pub mod error;
pub mod loader;
pub mod projects;
pub mod report;
pub mod retry;
pub mod splitter;
pub mod traits;
pub mod types;

pub use error::{Error, LoadError, Result, ServiceError, SplitError};
pub use loader::{ExternalLoader, Loader, LoaderConfig};
pub use projects::{ProjectBatch, ProjectIdentifier};
pub use report::{BatchReport, Stage};
pub use retry::{Exhausted, RetryPolicy, RetrySettings};
pub use splitter::{Splitter, SplitterConfig};
pub use traits::{Embedder, Generator};
pub use types::{
    Answer, Chunk, ChunkKind, Distance, Document, IndexEntry, Prompt, QueryResult, ScoredChunk, PROJECT_INDEX_SOURCE,
};
