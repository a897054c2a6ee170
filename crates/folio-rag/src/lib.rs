//! Retrieval-augmented answering over a folio index, plus the offline
//! build pipeline that produces that index.

pub mod generate;
pub mod pipeline;
pub mod prompt;
pub mod retriever;

pub use generate::{generator_from_settings, OpenAiGenerator, ScriptedGenerator};
pub use pipeline::{BuildOutcome, BuildPipeline};
pub use prompt::{build_prompt, parse_answer};
pub use retriever::Retriever;
